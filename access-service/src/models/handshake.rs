//! Browser-side state of an in-flight OIDC login.
//!
//! The state lives only in browser storage between the redirect to the
//! identity provider and the callback. It is written as flat string keys so a
//! page reload can resume the handshake.

use super::ids::ProviderId;
use chrono::{DateTime, Utc};

pub const KEY_PROVIDER_ID: &str = "providerID";
pub const KEY_STATE: &str = "state";
pub const KEY_REDIRECT_URL: &str = "redirectURL";
pub const KEY_NEXT: &str = "next";
pub const KEY_STARTED_AT: &str = "startedAt";
pub const KEY_ORG_HINT: &str = "finishLoginOrgHint";

pub const ALL_KEYS: [&str; 6] = [
    KEY_PROVIDER_ID,
    KEY_STATE,
    KEY_REDIRECT_URL,
    KEY_NEXT,
    KEY_STARTED_AT,
    KEY_ORG_HINT,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeState {
    pub provider_id: ProviderId,
    pub anti_forgery_token: String,
    pub redirect_url: String,
    /// URL-encoded path to visit after login.
    pub post_login_path: Option<String>,
    /// Host that started a shared-provider login.
    pub finish_login_org_hint: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl HandshakeState {
    pub fn to_entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = vec![
            (KEY_PROVIDER_ID, self.provider_id.to_string()),
            (KEY_STATE, self.anti_forgery_token.clone()),
            (KEY_REDIRECT_URL, self.redirect_url.clone()),
            (KEY_STARTED_AT, self.started_at.to_rfc3339()),
        ];
        if let Some(next) = &self.post_login_path {
            entries.push((KEY_NEXT, next.clone()));
        }
        if let Some(hint) = &self.finish_login_org_hint {
            entries.push((KEY_ORG_HINT, hint.clone()));
        }
        entries
    }

    /// Rebuild from storage. Returns `None` unless every required key is
    /// present and well formed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let provider_id = lookup(KEY_PROVIDER_ID)?.parse().ok()?;
        let anti_forgery_token = lookup(KEY_STATE)?;
        let redirect_url = lookup(KEY_REDIRECT_URL)?;
        let started_at = DateTime::parse_from_rfc3339(&lookup(KEY_STARTED_AT)?)
            .ok()?
            .with_timezone(&Utc);

        Some(Self {
            provider_id,
            anti_forgery_token,
            redirect_url,
            post_login_path: lookup(KEY_NEXT),
            finish_login_org_hint: lookup(KEY_ORG_HINT),
            started_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_state_key_is_not_a_handshake() {
        let state = HandshakeState {
            provider_id: ProviderId::new(),
            anti_forgery_token: "abc".into(),
            redirect_url: "https://acme.example.com/login/callback".into(),
            post_login_path: Some("%2Fdestinations".into()),
            finish_login_org_hint: None,
            started_at: Utc::now(),
        };
        let mut map: HashMap<&str, String> = state.to_entries().into_iter().collect();
        let restored = HandshakeState::from_lookup(|k| map.get(k).cloned()).unwrap();
        assert_eq!(restored.post_login_path.as_deref(), Some("%2Fdestinations"));
        assert_eq!(restored.provider_id, state.provider_id);

        map.remove(KEY_STATE);
        assert!(HandshakeState::from_lookup(|k| map.get(k).cloned()).is_none());
    }
}
