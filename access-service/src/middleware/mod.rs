pub mod auth;
pub mod metrics;
pub mod tenant;

pub use auth::{auth_middleware, optional_auth_middleware, AuthUser, AUTH_COOKIE};
pub use metrics::metrics_middleware;
pub use tenant::{tenant_middleware, Tenant};
