//! Identity providers.

use super::ids::{OrgId, ProviderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const DEFAULT_SCOPES: [&str; 4] = ["openid", "email", "groups", "offline_access"];

/// OIDC dialect spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Oidc,
    Okta,
    Azure,
    Google,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Oidc => "oidc",
            ProviderKind::Okta => "okta",
            ProviderKind::Azure => "azure",
            ProviderKind::Google => "google",
        }
    }

    /// Authorize, token and userinfo endpoints for a provider at `url`.
    pub fn endpoints(&self, url: &str) -> ProviderEndpoints {
        let host = url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        match self {
            ProviderKind::Oidc | ProviderKind::Okta => ProviderEndpoints {
                auth_url: format!("https://{host}/oauth2/v1/authorize"),
                token_url: format!("https://{host}/oauth2/v1/token"),
                userinfo_url: format!("https://{host}/oauth2/v1/userinfo"),
            },
            ProviderKind::Azure => ProviderEndpoints {
                auth_url: format!("https://{host}/oauth2/v2.0/authorize"),
                token_url: format!("https://{host}/oauth2/v2.0/token"),
                userinfo_url: "https://graph.microsoft.com/oidc/userinfo".to_string(),
            },
            ProviderKind::Google => ProviderEndpoints {
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            },
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "oidc" => Ok(ProviderKind::Oidc),
            "okta" => Ok(ProviderKind::Okta),
            "azure" => Ok(ProviderKind::Azure),
            "google" => Ok(ProviderKind::Google),
            _ => Err(format!("unknown provider kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

/// Where a provider's login completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderScope {
    /// Configured by one organization; its callback lives on that
    /// organization's subdomain.
    Organization(OrgId),
    /// A managed social login shared by every organization. Its single
    /// registered callback is the neutral redirect endpoint on the base domain.
    Shared,
}

#[derive(Debug, Clone)]
pub struct Provider {
    pub id: ProviderId,
    /// `None` for shared providers.
    pub org_id: Option<OrgId>,
    pub name: String,
    pub kind: ProviderKind,
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Provider {
    pub fn new(
        org_id: Option<OrgId>,
        name: impl Into<String>,
        kind: ProviderKind,
        url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            id: ProviderId::new(),
            org_id,
            name: name.into(),
            auth_url: kind.endpoints(&url).auth_url,
            kind,
            url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    pub fn scope(&self) -> ProviderScope {
        match self.org_id {
            Some(org_id) => ProviderScope::Organization(org_id),
            None => ProviderScope::Shared,
        }
    }

    pub fn is_managed(&self) -> bool {
        self.org_id.is_none()
    }

    pub fn endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints {
            auth_url: self.auth_url.clone(),
            ..self.kind.endpoints(&self.url)
        }
    }

    pub fn summary(&self) -> ProviderSummary {
        ProviderSummary::from(self)
    }
}

/// Public view of a provider. The client secret never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub id: ProviderId,
    pub name: String,
    pub kind: ProviderKind,
    pub url: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "authURL")]
    pub auth_url: String,
    pub scopes: Vec<String>,
    pub managed: bool,
}

impl From<&Provider> for ProviderSummary {
    fn from(p: &Provider) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            kind: p.kind,
            url: p.url.clone(),
            client_id: p.client_id.clone(),
            auth_url: p.auth_url.clone(),
            scopes: p.scopes.clone(),
            managed: p.is_managed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_omits_secret() {
        let provider = Provider::new(
            Some(OrgId::new()),
            "okta",
            ProviderKind::Okta,
            "example.okta.com",
            "client",
            "very-secret",
        );
        let json = serde_json::to_string(&provider.summary()).unwrap();
        assert!(!json.contains("very-secret"));
        assert!(json.contains("\"clientID\":\"client\""));
        assert!(json.contains("\"authURL\":\"https://example.okta.com/oauth2/v1/authorize\""));
    }

    #[test]
    fn test_scope_follows_ownership() {
        let org = OrgId::new();
        let owned = Provider::new(Some(org), "okta", ProviderKind::Okta, "x", "c", "s");
        let shared = Provider::new(None, "google", ProviderKind::Google, "accounts.google.com", "c", "s");
        assert_eq!(owned.scope(), ProviderScope::Organization(org));
        assert_eq!(shared.scope(), ProviderScope::Shared);
        assert!(shared.summary().managed);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("Okta".parse::<ProviderKind>().unwrap(), ProviderKind::Okta);
        assert!("saml".parse::<ProviderKind>().is_err());
    }
}
