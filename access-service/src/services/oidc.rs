//! Authorization-code exchange against an identity provider.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use service_core::observability::traced;
use std::time::Duration;
use tracing::instrument;

use crate::models::Provider;
use crate::services::error::ServiceError;

/// Identity asserted by a provider after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub email: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[async_trait]
pub trait OidcExchanger: Send + Sync {
    /// Trade an authorization `code` for the user's identity. Provider
    /// failures come back as `ProviderError` with the provider's own message.
    async fn exchange(
        &self,
        provider: &Provider,
        code: &str,
        redirect_url: &str,
    ) -> Result<UserInfo, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

impl ProviderErrorBody {
    fn message(self) -> Option<String> {
        self.error_description
            .filter(|d| !d.is_empty())
            .or(self.error)
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    email: Option<String>,
    #[serde(default)]
    groups: Vec<String>,
}

/// Exchanges codes over HTTPS.
#[derive(Clone)]
pub struct ReqwestOidcExchanger {
    client: reqwest::Client,
}

impl ReqwestOidcExchanger {
    pub fn new() -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self { client })
    }

    async fn provider_error(response: reqwest::Response) -> ServiceError {
        let status = response.status();
        let message = response
            .json::<ProviderErrorBody>()
            .await
            .ok()
            .and_then(ProviderErrorBody::message)
            .unwrap_or_else(|| format!("identity provider returned {}", status));
        tracing::warn!(%status, %message, "Identity provider rejected request");
        ServiceError::ProviderError(message)
    }
}

#[async_trait]
impl OidcExchanger for ReqwestOidcExchanger {
    #[instrument(skip(self, provider, code), fields(provider_id = %provider.id, kind = %provider.kind))]
    async fn exchange(
        &self,
        provider: &Provider,
        code: &str,
        redirect_url: &str,
    ) -> Result<UserInfo, ServiceError> {
        let endpoints = provider.endpoints();

        let response = traced(self.client.post(&endpoints.token_url))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_url),
                ("client_id", provider.client_id.as_str()),
                ("client_secret", provider.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("invalid token response: {}", e)))?;

        let response = traced(self.client.get(&endpoints.userinfo_url))
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("userinfo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let info: UserInfoResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("invalid userinfo response: {}", e)))?;

        let email = info
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ServiceError::ProviderError("identity provider did not return an email".into()))?;

        Ok(UserInfo {
            email,
            groups: info.groups,
        })
    }
}

/// Exchanger for tests: each code maps to an identity or a provider error.
#[derive(Default)]
pub struct MockOidcExchanger {
    outcomes: DashMap<String, Result<UserInfo, String>>,
    exchanges: std::sync::Mutex<Vec<(String, String)>>,
}

impl MockOidcExchanger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(self, code: &str, email: &str) -> Self {
        self.outcomes.insert(
            code.to_string(),
            Ok(UserInfo {
                email: email.to_string(),
                groups: vec![],
            }),
        );
        self
    }

    pub fn with_error(self, code: &str, message: &str) -> Self {
        self.outcomes.insert(code.to_string(), Err(message.to_string()));
        self
    }

    /// `(code, redirect_url)` pairs seen so far.
    pub fn exchanges(&self) -> Vec<(String, String)> {
        self.exchanges
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OidcExchanger for MockOidcExchanger {
    async fn exchange(
        &self,
        _provider: &Provider,
        code: &str,
        redirect_url: &str,
    ) -> Result<UserInfo, ServiceError> {
        if let Ok(mut seen) = self.exchanges.lock() {
            seen.push((code.to_string(), redirect_url.to_string()));
        }
        match self.outcomes.get(code).map(|o| o.value().clone()) {
            Some(Ok(info)) => Ok(info),
            Some(Err(message)) => Err(ServiceError::ProviderError(message)),
            None => Err(ServiceError::ProviderError("invalid_grant".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrgId, ProviderKind};

    fn provider() -> Provider {
        Provider::new(
            Some(OrgId::new()),
            "okta",
            ProviderKind::Okta,
            "example.okta.com",
            "client",
            "secret",
        )
    }

    #[test]
    fn test_error_description_preferred() {
        let body = ProviderErrorBody {
            error: Some("access_denied".into()),
            error_description: Some("User is not assigned to the client application.".into()),
        };
        assert_eq!(
            body.message().as_deref(),
            Some("User is not assigned to the client application.")
        );

        let body = ProviderErrorBody {
            error: Some("invalid_grant".into()),
            error_description: Some(String::new()),
        };
        assert_eq!(body.message().as_deref(), Some("invalid_grant"));
    }

    #[tokio::test]
    async fn test_mock_exchanger() {
        let mock = MockOidcExchanger::new()
            .with_identity("good", "u1@example.com")
            .with_error("bad", "access_denied");
        let provider = provider();

        let info = mock.exchange(&provider, "good", "https://acme.example.com/login/callback").await.unwrap();
        assert_eq!(info.email, "u1@example.com");

        let err = mock.exchange(&provider, "bad", "x").await.unwrap_err();
        assert_eq!(err.to_string(), "access_denied");
        assert_eq!(mock.exchanges().len(), 2);
    }
}
