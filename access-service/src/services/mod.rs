//! Services layer for access-service.
//!
//! Grant storage and caching, privilege resolution, the admin invariant
//! guard, and the login handshake.

pub mod admin_guard;
pub mod browser;
pub mod directory;
pub mod error;
pub mod grant_cache;
pub mod grant_store;
pub mod handshake;
pub mod jwt;
pub mod login;
pub mod metrics;
pub mod oidc;
pub mod repository;
pub mod resolver;
pub mod session_store;

pub use admin_guard::{AdminGuard, BatchResult, RemovalOutcome};
pub use browser::{BrowserStorage, CookieStore, MemoryCookies, MemoryStorage, Navigation};
pub use directory::Directory;
pub use error::ServiceError;
pub use grant_cache::{GrantListCache, GrantListView};
pub use grant_store::{GrantStore, InMemoryGrantStore};
pub use handshake::{
    CallbackParams, HandshakeController, HandshakePhase, HandshakeSettings, HttpLoginClient,
    LocalLoginClient, LoginClient,
};
pub use jwt::{JwtService, SessionClaims};
pub use login::{LoginOutcome, LoginRequest, LoginResponse, LoginService};
pub use oidc::{MockOidcExchanger, OidcExchanger, ReqwestOidcExchanger, UserInfo};
pub use repository::{GrantRepository, PageLimits};
pub use resolver::{PrivilegeResolver, Resolution};
pub use session_store::SessionStore;
