//! Organization resolution from the request host.
//!
//! Every organization is served from `{domain}.{base_domain}`. Requests to
//! the base domain itself carry no organization.

use service_core::{
    axum::{
        async_trait,
        extract::{FromRequestParts, Request, State},
        http::{header, request::Parts, HeaderMap},
        middleware::Next,
        response::Response,
    },
    error::AppError,
};

use crate::{models::Organization, AppState};

/// The organization a request is addressed to.
#[derive(Debug, Clone)]
pub struct Tenant(pub Organization);

/// Host the browser used, without port. Prefers `X-Forwarded-Host` set by the
/// ingress.
pub fn request_host(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .map(|h| h.split(',').next().unwrap_or(h).trim())
        .map(|h| h.split(':').next().unwrap_or(h).to_ascii_lowercase())
}

/// The organization label of `host`, if it is directly under `base_domain`.
pub fn organization_label<'a>(host: &'a str, base_domain: &str) -> Option<&'a str> {
    host.strip_suffix(base_domain)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|label| !label.is_empty() && !label.contains('.'))
}

pub async fn tenant_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let label = request_host(req.headers())
        .and_then(|host| organization_label(&host, &state.config.base_domain).map(str::to_string));

    if let Some(label) = label {
        let organization = state
            .directory
            .organization_by_domain(&label)
            .await
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("organization not found")))?;
        req.extensions_mut().insert(Tenant(organization));
    }

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Tenant>().cloned().ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "request is not addressed to an organization"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::http::HeaderValue;

    #[test]
    fn test_organization_label() {
        assert_eq!(organization_label("acme.example.com", "example.com"), Some("acme"));
        assert_eq!(organization_label("example.com", "example.com"), None);
        assert_eq!(organization_label("a.b.example.com", "example.com"), None);
        assert_eq!(organization_label("acmeexample.com", "example.com"), None);
        assert_eq!(organization_label("acme.other.com", "example.com"), None);
    }

    #[test]
    fn test_request_host_strips_port_and_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("Acme.example.com:8080"));
        assert_eq!(request_host(&headers).as_deref(), Some("acme.example.com"));

        headers.insert("x-forwarded-host", HeaderValue::from_static("beta.example.com"));
        assert_eq!(request_host(&headers).as_deref(), Some("beta.example.com"));
    }
}
