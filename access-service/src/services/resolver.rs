//! Privilege resolution.
//!
//! A user's effective grants are their own plus those of every group they
//! are in (groups do not nest). A lookup on `base.namespace` that finds
//! nothing falls back to `base`, and hits found that way are marked
//! inherited. Matches are ordered by role severity and never collapsed;
//! callers pick `any` or `highest`.

use crate::models::{
    grant::{base_of, ADMIN_PRIVILEGE, ORG_RESOURCE, SUPER_PRIVILEGE},
    role, Grant, GrantFilter, GrantId, OrgId, RoleOption, Subject, UserId,
};
use crate::services::{error::ServiceError, repository::GrantRepository};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPrivilege {
    pub privilege: String,
    /// Resource the backing grant is on. Differs from the queried resource
    /// when inherited.
    pub resource: String,
    pub inherited: bool,
    pub grant_id: GrantId,
    pub via: Subject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    matches: Vec<ResolvedPrivilege>,
}

impl Resolution {
    fn from_matches(mut matches: Vec<ResolvedPrivilege>) -> Self {
        matches.sort_by(|a, b| {
            role::compare(&a.privilege, &b.privilege).then(a.inherited.cmp(&b.inherited))
        });
        Self { matches }
    }

    pub fn matches(&self) -> &[ResolvedPrivilege] {
        &self.matches
    }

    pub fn any(&self) -> bool {
        !self.matches.is_empty()
    }

    pub fn highest(&self) -> Option<&ResolvedPrivilege> {
        self.matches.first()
    }

    pub fn allows(&self, privilege: &str) -> bool {
        self.matches
            .iter()
            .any(|m| m.privilege == privilege || m.privilege == SUPER_PRIVILEGE)
    }

    pub fn privilege(&self, privilege: &str) -> Option<&ResolvedPrivilege> {
        self.matches.iter().find(|m| m.privilege == privilege)
    }
}

fn resolved(grant: &Grant, inherited: bool) -> ResolvedPrivilege {
    ResolvedPrivilege {
        privilege: grant.privilege.clone(),
        resource: grant.resource.clone(),
        inherited,
        grant_id: grant.id,
        via: grant.subject,
    }
}

/// Keep one match per privilege, preferring a direct user grant.
fn dedup_by_privilege(grants: Vec<&Grant>) -> Vec<&Grant> {
    let mut kept: Vec<&Grant> = Vec::new();
    for grant in grants {
        match kept.iter_mut().find(|k| k.privilege == grant.privilege) {
            Some(existing) => {
                if matches!(grant.subject, Subject::User(_))
                    && matches!(existing.subject, Subject::Group(_))
                {
                    *existing = grant;
                }
            }
            None => kept.push(grant),
        }
    }
    kept
}

/// Grants on exactly `resource` that carry `privilege` or the super-privilege.
fn exact_matches<'a>(grants: &'a [Grant], resource: &str, privilege: &str) -> Vec<&'a Grant> {
    dedup_by_privilege(
        grants
            .iter()
            .filter(|g| g.resource == resource)
            .filter(|g| g.privilege == privilege || g.privilege == SUPER_PRIVILEGE)
            .collect(),
    )
}

pub struct PrivilegeResolver {
    repository: Arc<GrantRepository>,
}

impl PrivilegeResolver {
    pub fn new(repository: Arc<GrantRepository>) -> Self {
        Self { repository }
    }

    /// Every privilege the user holds on `resource`. On a namespace, base
    /// privileges not also held on the namespace itself are included as
    /// inherited.
    #[tracing::instrument(skip(self), fields(org_id = %org_id, user_id = %user_id))]
    pub async fn resolve(
        &self,
        org_id: OrgId,
        user_id: UserId,
        resource: &str,
    ) -> Result<Resolution, ServiceError> {
        let grants = self.repository.effective_grants(org_id, user_id).await?;

        let direct = dedup_by_privilege(grants.iter().filter(|g| g.resource == resource).collect());
        let mut matches: Vec<ResolvedPrivilege> = direct.iter().map(|g| resolved(g, false)).collect();

        if let Some(base) = base_of(resource) {
            let on_base = dedup_by_privilege(grants.iter().filter(|g| g.resource == base).collect());
            matches.extend(
                on_base
                    .into_iter()
                    .filter(|g| !direct.iter().any(|d| d.privilege == g.privilege))
                    .map(|g| resolved(g, true)),
            );
        }

        Ok(Resolution::from_matches(matches))
    }

    /// Whether the user holds `privilege` on `resource`. An exact match or
    /// `cluster-admin` on the resource wins; otherwise a namespace falls back
    /// to its base. No grants resolves to an empty, denying result.
    #[tracing::instrument(skip(self), fields(org_id = %org_id, user_id = %user_id))]
    pub async fn check(
        &self,
        org_id: OrgId,
        user_id: UserId,
        resource: &str,
        privilege: &str,
    ) -> Result<Resolution, ServiceError> {
        let grants = self.repository.effective_grants(org_id, user_id).await?;

        let direct = exact_matches(&grants, resource, privilege);
        if !direct.is_empty() {
            return Ok(Resolution::from_matches(
                direct.into_iter().map(|g| resolved(g, false)).collect(),
            ));
        }

        let inherited = base_of(resource)
            .map(|base| exact_matches(&grants, base, privilege))
            .unwrap_or_default();
        Ok(Resolution::from_matches(
            inherited.into_iter().map(|g| resolved(g, true)).collect(),
        ))
    }

    pub async fn is_org_admin(&self, org_id: OrgId, user_id: UserId) -> Result<bool, ServiceError> {
        Ok(self
            .check(org_id, user_id, ORG_RESOURCE, ADMIN_PRIVILEGE)
            .await?
            .any())
    }

    pub fn assignable_roles(&self, resource: &str) -> Vec<RoleOption> {
        role::assignable(resource)
    }

    /// For a namespace whose base has no grants at all, a note saying so.
    /// Advisory only; nothing is blocked.
    pub async fn missing_base_advisory(
        &self,
        org_id: OrgId,
        resource: &str,
    ) -> Result<Option<String>, ServiceError> {
        let Some(base) = base_of(resource) else {
            return Ok(None);
        };
        let on_base = self
            .repository
            .query_all(org_id, &GrantFilter::for_resource(base))
            .await?;
        Ok(on_base
            .is_empty()
            .then(|| format!("'{base}' has no grants; '{resource}' cannot inherit from it")))
    }
}
