pub mod grant;
pub mod handshake;
pub mod ids;
pub mod organization;
pub mod page;
pub mod provider;
pub mod role;
pub mod session;
pub mod user;

pub use grant::{BatchItemFailure, BatchOutcome, Grant, GrantFilter, NewGrant, Subject};
pub use handshake::HandshakeState;
pub use ids::{GrantId, GroupId, OrgId, ProviderId, UserId};
pub use organization::{ForgottenDomain, Organization, VisitedOrg};
pub use page::Page;
pub use provider::{Provider, ProviderKind, ProviderScope, ProviderSummary};
pub use role::{RoleChange, RoleOption};
pub use session::Session;
pub use user::{Credential, Group, User, UserResponse};
