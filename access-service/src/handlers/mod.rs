//! HTTP handlers for access-service.

pub mod auth;
pub mod grants;
pub mod metrics;
pub mod users;

use service_core::error::AppError;

use crate::{middleware::AuthUser, AppState};

/// Fail with 403 unless the caller holds `infra/admin`, directly or through
/// a group.
pub(crate) async fn require_org_admin(state: &AppState, user: &AuthUser) -> Result<(), AppError> {
    if state.resolver.is_org_admin(user.org_id, user.user_id).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!(
            "requires the infra admin role"
        )))
    }
}
