//! Grant model: a (subject, resource, privilege) triple scoped to one
//! organization.

use super::ids::{GrantId, GroupId, OrgId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource naming the organization itself.
pub const ORG_RESOURCE: &str = "infra";
pub const ADMIN_PRIVILEGE: &str = "admin";
pub const VIEW_PRIVILEGE: &str = "view";
/// Held by connectors; hidden from listings unless system grants are requested.
pub const CONNECTOR_PRIVILEGE: &str = "connector";
/// Super-privilege on a cluster. Satisfies any privilege check on the same resource.
pub const SUPER_PRIVILEGE: &str = "cluster-admin";
/// Picker value meaning "delete this grant". Never stored.
pub const REMOVE_PRIVILEGE: &str = "remove";

/// Who a grant is for. Serialized as `{"user": id}` or `{"group": id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    User(UserId),
    Group(GroupId),
}

impl Subject {
    pub fn as_user(&self) -> Option<UserId> {
        match self {
            Subject::User(id) => Some(*id),
            Subject::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<GroupId> {
        match self {
            Subject::Group(id) => Some(*id),
            Subject::User(_) => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::User(id) => write!(f, "user:{id}"),
            Subject::Group(id) => write!(f, "group:{id}"),
        }
    }
}

/// Split `base.namespace` into its base. Returns `None` for a base resource.
pub fn base_of(resource: &str) -> Option<&str> {
    resource.split_once('.').map(|(base, _)| base)
}

pub fn is_namespaced(resource: &str) -> bool {
    resource.contains('.')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub id: GrantId,
    pub organization_id: OrgId,
    #[serde(flatten)]
    pub subject: Subject,
    pub resource: String,
    pub privilege: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
}

impl Grant {
    pub fn new(org_id: OrgId, new: NewGrant, created_by: Option<UserId>) -> Self {
        Self {
            id: GrantId::new(),
            organization_id: org_id,
            subject: new.subject,
            resource: new.resource,
            privilege: new.privilege,
            created: Utc::now(),
            created_by,
        }
    }

    /// `infra/admin`, the organization-admin grant.
    pub fn is_org_admin(&self) -> bool {
        self.resource == ORG_RESOURCE && self.privilege == ADMIN_PRIVILEGE
    }

    pub fn is_connector(&self) -> bool {
        self.resource == ORG_RESOURCE && self.privilege == CONNECTOR_PRIVILEGE
    }

    pub fn same_triple(&self, other: &NewGrant) -> bool {
        self.subject == other.subject
            && self.resource == other.resource
            && self.privilege == other.privilege
    }
}

/// A grant that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewGrant {
    #[serde(flatten)]
    pub subject: Subject,
    pub resource: String,
    pub privilege: String,
}

impl NewGrant {
    pub fn new(subject: Subject, resource: impl Into<String>, privilege: impl Into<String>) -> Self {
        Self {
            subject,
            resource: resource.into(),
            privilege: privilege.into(),
        }
    }

    /// Reject triples that can never be stored.
    pub fn check(&self) -> Result<(), String> {
        if self.resource.trim().is_empty() {
            return Err("resource is required".to_string());
        }
        if self.privilege.trim().is_empty() {
            return Err("privilege is required".to_string());
        }
        if self.privilege == REMOVE_PRIVILEGE {
            return Err(format!("'{REMOVE_PRIVILEGE}' is not a privilege"));
        }
        if self.resource.split('.').any(str::is_empty) || self.resource.matches('.').count() > 1 {
            return Err(format!("invalid resource name '{}'", self.resource));
        }
        Ok(())
    }
}

/// Query over the grants of one organization. Also the cache key for list
/// results, so two equal filters always share a cached page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GrantFilter {
    /// Exact resource match.
    pub resource: Option<String>,
    pub subject: Option<Subject>,
    pub privilege: Option<String>,
    /// Matches `d` and every `d.*` namespace.
    pub destination: Option<String>,
    /// With a user subject, also return grants held by the user's groups.
    pub include_inherited_from_groups: bool,
    /// Include `infra/connector` grants.
    pub show_system: bool,
    /// 1-indexed.
    pub page: u32,
    pub limit: u32,
}

impl GrantFilter {
    pub fn for_resource(resource: impl Into<String>) -> Self {
        Self {
            resource: Some(resource.into()),
            ..Default::default()
        }
    }

    pub fn for_subject(subject: Subject) -> Self {
        Self {
            subject: Some(subject),
            ..Default::default()
        }
    }

    pub fn with_privilege(mut self, privilege: impl Into<String>) -> Self {
        self.privilege = Some(privilege.into());
        self
    }

    /// Clamp paging to `1..` and `1..=max_limit`, using `default_limit` when unset.
    pub fn normalized(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.page = self.page.max(1);
        self.limit = match self.limit {
            0 => default_limit,
            n => n.min(max_limit),
        }
        .max(1);
        self
    }

    /// Non-subject predicates, applied by the store.
    pub fn matches_attributes(&self, grant: &Grant) -> bool {
        self.resource.as_deref().is_none_or(|r| grant.resource == r)
            && self.privilege.as_deref().is_none_or(|p| grant.privilege == p)
            && self
                .destination
                .as_deref()
                .is_none_or(|d| within_destination(&grant.resource, d))
            && (self.show_system || !grant.is_connector())
    }

    /// Whether a change to `grant` could alter the result of this filter.
    /// Errs on the side of `true` for group grants when group inheritance is
    /// requested, since membership is resolved at query time.
    pub fn could_include(&self, grant: &Grant) -> bool {
        let subject_match = match self.subject {
            None => true,
            Some(subject) if subject == grant.subject => true,
            Some(Subject::User(_)) => {
                self.include_inherited_from_groups && matches!(grant.subject, Subject::Group(_))
            }
            Some(Subject::Group(_)) => false,
        };
        subject_match && self.matches_attributes(grant)
    }
}

fn within_destination(resource: &str, destination: &str) -> bool {
    resource == destination
        || resource
            .strip_prefix(destination)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Outcome of one item in a batch mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    #[serde(flatten)]
    pub grant: NewGrant,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub added: Vec<Grant>,
    pub removed: Vec<GrantId>,
    pub failures: Vec<BatchItemFailure>,
}

impl BatchOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(subject: Subject, resource: &str, privilege: &str) -> Grant {
        Grant::new(OrgId::new(), NewGrant::new(subject, resource, privilege), None)
    }

    #[test]
    fn test_subject_serializes_as_tagged_key() {
        let user = UserId::new();
        let json = serde_json::to_value(NewGrant::new(Subject::User(user), "infra", "admin")).unwrap();
        assert_eq!(json["user"], user.to_string());
        assert_eq!(json["resource"], "infra");
        assert!(json.get("group").is_none());
    }

    #[test]
    fn test_remove_sentinel_is_rejected() {
        let new = NewGrant::new(Subject::User(UserId::new()), "cluster-a", REMOVE_PRIVILEGE);
        assert!(new.check().is_err());
    }

    #[test]
    fn test_resource_shape_is_checked() {
        let user = Subject::User(UserId::new());
        assert!(NewGrant::new(user, "cluster-a.prod", "view").check().is_ok());
        assert!(NewGrant::new(user, "cluster-a.", "view").check().is_err());
        assert!(NewGrant::new(user, "a.b.c", "view").check().is_err());
        assert!(NewGrant::new(user, " ", "view").check().is_err());
    }

    #[test]
    fn test_base_of() {
        assert_eq!(base_of("cluster-a.prod"), Some("cluster-a"));
        assert_eq!(base_of("cluster-a"), None);
    }

    #[test]
    fn test_destination_matches_namespaces_but_not_prefixes() {
        let filter = GrantFilter {
            destination: Some("cluster-a".into()),
            ..Default::default()
        };
        let user = Subject::User(UserId::new());
        assert!(filter.matches_attributes(&grant(user, "cluster-a", "view")));
        assert!(filter.matches_attributes(&grant(user, "cluster-a.prod", "view")));
        assert!(!filter.matches_attributes(&grant(user, "cluster-ab", "view")));
    }

    #[test]
    fn test_connector_grants_hidden_by_default() {
        let connector = grant(Subject::User(UserId::new()), ORG_RESOURCE, CONNECTOR_PRIVILEGE);
        assert!(!GrantFilter::default().matches_attributes(&connector));
        let system = GrantFilter {
            show_system: true,
            ..Default::default()
        };
        assert!(system.matches_attributes(&connector));
    }

    #[test]
    fn test_could_include_by_axis() {
        let user = UserId::new();
        let g = grant(Subject::User(user), "cluster-a", "view");

        assert!(GrantFilter::default().could_include(&g));
        assert!(GrantFilter::for_resource("cluster-a").could_include(&g));
        assert!(!GrantFilter::for_resource("cluster-b").could_include(&g));
        assert!(GrantFilter::for_subject(Subject::User(user)).could_include(&g));
        assert!(!GrantFilter::for_subject(Subject::User(UserId::new())).could_include(&g));
        assert!(!GrantFilter::default().with_privilege("edit").could_include(&g));
    }

    #[test]
    fn test_group_grant_invalidates_inherited_user_filter() {
        let group_grant = grant(Subject::Group(GroupId::new()), "infra", "admin");
        let mut filter = GrantFilter::for_subject(Subject::User(UserId::new()));
        assert!(!filter.could_include(&group_grant));
        filter.include_inherited_from_groups = true;
        assert!(filter.could_include(&group_grant));
    }

    #[test]
    fn test_normalized_paging() {
        let f = GrantFilter::default().normalized(100, 1000);
        assert_eq!((f.page, f.limit), (1, 100));
        let f = GrantFilter {
            page: 3,
            limit: 5000,
            ..Default::default()
        }
        .normalized(100, 1000);
        assert_eq!((f.page, f.limit), (3, 1000));
    }
}
