//! Users, groups and local password credentials.

use super::ids::{GroupId, OrgId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Provider name recorded for users that authenticate with a local password.
pub const LOCAL_PROVIDER_NAME: &str = "infra";

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub org_id: OrgId,
    /// Email address.
    pub name: String,
    /// Every identity provider that has authenticated this user.
    pub provider_names: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(org_id: OrgId, name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            org_id,
            name: name.into(),
            provider_names: BTreeSet::new(),
            created_at: Utc::now(),
            last_seen_at: None,
        }
    }

    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self)
    }
}

/// User as returned over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: UserId,
    pub name: String,
    pub provider_names: Vec<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            provider_names: user.provider_names.iter().cloned().collect(),
            last_seen_at: user.last_seen_at,
        }
    }
}

/// A flat group of users. Groups never contain other groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub org_id: OrgId,
    pub name: String,
    pub members: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(org_id: OrgId, name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            org_id,
            name: name.into(),
            members: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }
}

/// Argon2 password hash for the local provider.
#[derive(Debug, Clone)]
pub struct Credential {
    pub user_id: UserId,
    pub password_hash: String,
    /// Set when an admin assigned the password; the user must replace it
    /// before a session is issued.
    pub one_time_password: bool,
}
