use crate::models::GrantId;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("{0} already exists")]
    Conflict(String, Option<String>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("cannot remove the last infra admin")]
    LastAdminViolation,

    #[error("login state does not match, please try again")]
    AntiForgeryMismatch,

    #[error("login attempt expired, please try again")]
    HandshakeExpired,

    /// Message from the identity provider, passed through unchanged.
    #[error("{0}")]
    ProviderError(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ServiceError {
    pub fn grant_conflict(existing: GrantId) -> Self {
        ServiceError::Conflict("grant".to_string(), Some(existing.to_string()))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ServiceError::NotFound(what.into())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::Conflict(_, existing) => {
                AppError::Conflict(anyhow::anyhow!(message), existing)
            }
            ServiceError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            ServiceError::LastAdminViolation
            | ServiceError::AntiForgeryMismatch
            | ServiceError::HandshakeExpired
            | ServiceError::ValidationError(_) => AppError::BadRequest(anyhow::anyhow!(message)),
            ServiceError::ProviderError(msg) => AppError::BadGateway(msg),
            ServiceError::InvalidCredentials
            | ServiceError::InvalidToken
            | ServiceError::TokenExpired => AppError::Unauthorized(anyhow::anyhow!(message)),
            ServiceError::Forbidden(_) => AppError::Forbidden(anyhow::anyhow!(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};

    fn status(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status(ServiceError::grant_conflict(GrantId::new())), StatusCode::CONFLICT);
        assert_eq!(status(ServiceError::not_found("grant")), StatusCode::NOT_FOUND);
        assert_eq!(status(ServiceError::LastAdminViolation), StatusCode::BAD_REQUEST);
        assert_eq!(status(ServiceError::AntiForgeryMismatch), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(ServiceError::ProviderError("access_denied".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status(ServiceError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ServiceError::Forbidden("x".into())), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_provider_message_is_verbatim() {
        let err = ServiceError::ProviderError("User is not assigned to the client application.".into());
        assert_eq!(err.to_string(), "User is not assigned to the client application.");
    }
}
