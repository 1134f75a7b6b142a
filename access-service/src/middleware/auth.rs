use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    middleware::tenant::Tenant,
    models::{OrgId, UserId},
    services::SessionClaims,
    AppState,
};

/// Cookie carrying the session token for browser clients.
pub const AUTH_COOKIE: &str = "auth";

fn bearer_or_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| {
            CookieJar::from_headers(headers)
                .get(AUTH_COOKIE)
                .map(|c| c.value().to_string())
        })
}

/// Validate the request's session token. A session issued for one
/// organization is not accepted on another organization's host.
fn authenticate(state: &AppState, req: &Request) -> Result<SessionClaims, AppError> {
    let token = bearer_or_cookie(req.headers()).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
    })?;

    let claims = state.jwt.validate(&token)?;

    if let Some(Tenant(org)) = req.extensions().get::<Tenant>() {
        if claims.org_id()? != org.id {
            tracing::warn!(org_id = %org.id, session_org = %claims.org, "Session used on another organization");
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Session does not belong to this organization"
            )));
        }
    }
    Ok(claims)
}

/// Middleware to require authentication
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(&state, &req)?;

    // Store claims in request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Like `auth_middleware`, but lets anonymous requests through.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if bearer_or_cookie(req.headers()).is_some() {
        match authenticate(&state, &req) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
            }
            Err(e) => tracing::debug!(error = %e, "Ignoring invalid session on optional route"),
        }
    }
    next.run(req).await
}

/// Extractor to easily get the session in handlers
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: SessionClaims,
    pub user_id: UserId,
    pub org_id: OrgId,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<SessionClaims>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))?;

        Ok(AuthUser {
            user_id: claims.user_id()?,
            org_id: claims.org_id()?,
            claims,
        })
    }
}
