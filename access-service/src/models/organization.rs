use super::ids::OrgId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tenant. `domain` is the DNS label that routes a browser to it
/// (`{domain}.{base_domain}`) and never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub domain: String,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: OrgId::new(),
            name: name.into(),
            domain: domain.into(),
            created_at: Utc::now(),
        }
    }
}

/// Whether `label` is usable as an organization domain: a single lowercase
/// DNS label of 1 to 63 characters that does not start or end with `-`.
pub fn is_valid_domain(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Entry of the `orgs` cookie that remembers organizations this browser has
/// logged into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisitedOrg {
    pub url: String,
    pub name: String,
}

/// An organization where an email address has signed in before.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForgottenDomain {
    pub organization_name: String,
    pub organization_domain: String,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_labels() {
        assert!(is_valid_domain("acme"));
        assert!(is_valid_domain("acme-2"));
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("-acme"));
        assert!(!is_valid_domain("acme-"));
        assert!(!is_valid_domain("Acme"));
        assert!(!is_valid_domain("acme.example"));
        assert!(!is_valid_domain(&"a".repeat(64)));
    }
}
