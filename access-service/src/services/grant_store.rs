use crate::models::{Grant, GrantFilter, GrantId, NewGrant, OrgId, Subject};
use crate::services::error::ServiceError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage for grant rows. Implementations enforce triple uniqueness but
/// know nothing about organization-admin rules.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Insert a grant. `Conflict` carrying the existing id when the
    /// (subject, resource, privilege) triple is already stored.
    async fn insert(&self, grant: Grant) -> Result<Grant, ServiceError>;

    async fn get(&self, org_id: OrgId, id: GrantId) -> Result<Option<Grant>, ServiceError>;

    async fn find(&self, org_id: OrgId, triple: &NewGrant) -> Result<Option<Grant>, ServiceError>;

    /// `NotFound` when absent.
    async fn delete(&self, org_id: OrgId, id: GrantId) -> Result<Grant, ServiceError>;

    async fn delete_by_subject(
        &self,
        org_id: OrgId,
        subject: Subject,
    ) -> Result<Vec<Grant>, ServiceError>;

    /// Every grant matching the filter's attributes, in creation order.
    /// `subjects` restricts the subject axis; empty means any subject.
    async fn query(
        &self,
        org_id: OrgId,
        filter: &GrantFilter,
        subjects: &[Subject],
    ) -> Result<Vec<Grant>, ServiceError>;
}

/// Grants held in process memory, in insertion order per organization.
#[derive(Default)]
pub struct InMemoryGrantStore {
    grants: RwLock<HashMap<OrgId, Vec<Grant>>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn insert(&self, grant: Grant) -> Result<Grant, ServiceError> {
        let mut grants = self.grants.write().await;
        let rows = grants.entry(grant.organization_id).or_default();

        if let Some(existing) = rows.iter().find(|g| {
            g.subject == grant.subject
                && g.resource == grant.resource
                && g.privilege == grant.privilege
        }) {
            return Err(ServiceError::grant_conflict(existing.id));
        }

        rows.push(grant.clone());
        Ok(grant)
    }

    async fn get(&self, org_id: OrgId, id: GrantId) -> Result<Option<Grant>, ServiceError> {
        Ok(self
            .grants
            .read()
            .await
            .get(&org_id)
            .and_then(|rows| rows.iter().find(|g| g.id == id).cloned()))
    }

    async fn find(&self, org_id: OrgId, triple: &NewGrant) -> Result<Option<Grant>, ServiceError> {
        Ok(self
            .grants
            .read()
            .await
            .get(&org_id)
            .and_then(|rows| rows.iter().find(|g| g.same_triple(triple)).cloned()))
    }

    async fn delete(&self, org_id: OrgId, id: GrantId) -> Result<Grant, ServiceError> {
        let mut grants = self.grants.write().await;
        let rows = grants
            .get_mut(&org_id)
            .ok_or_else(|| ServiceError::not_found("grant"))?;
        let index = rows
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| ServiceError::not_found("grant"))?;
        Ok(rows.remove(index))
    }

    async fn delete_by_subject(
        &self,
        org_id: OrgId,
        subject: Subject,
    ) -> Result<Vec<Grant>, ServiceError> {
        let mut grants = self.grants.write().await;
        let Some(rows) = grants.get_mut(&org_id) else {
            return Ok(vec![]);
        };
        let (removed, kept): (Vec<Grant>, Vec<Grant>) =
            rows.drain(..).partition(|g| g.subject == subject);
        *rows = kept;
        Ok(removed)
    }

    async fn query(
        &self,
        org_id: OrgId,
        filter: &GrantFilter,
        subjects: &[Subject],
    ) -> Result<Vec<Grant>, ServiceError> {
        Ok(self
            .grants
            .read()
            .await
            .get(&org_id)
            .map(|rows| {
                rows.iter()
                    .filter(|g| subjects.is_empty() || subjects.contains(&g.subject))
                    .filter(|g| filter.matches_attributes(g))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;

    fn grant(org: OrgId, subject: Subject, resource: &str, privilege: &str) -> Grant {
        Grant::new(org, NewGrant::new(subject, resource, privilege), None)
    }

    #[tokio::test]
    async fn test_duplicate_triple_conflicts_with_existing_id() {
        let store = InMemoryGrantStore::new();
        let org = OrgId::new();
        let user = Subject::User(UserId::new());

        let first = store.insert(grant(org, user, "infra", "admin")).await.unwrap();
        let err = store.insert(grant(org, user, "infra", "admin")).await.unwrap_err();

        match err {
            ServiceError::Conflict(_, Some(id)) => assert_eq!(id, first.id.to_string()),
            other => panic!("expected conflict, got {other:?}"),
        }
        let all = store.query(org, &GrantFilter::default(), &[]).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_same_triple_in_other_org_is_independent() {
        let store = InMemoryGrantStore::new();
        let user = Subject::User(UserId::new());
        store.insert(grant(OrgId::new(), user, "infra", "admin")).await.unwrap();
        assert!(store.insert(grant(OrgId::new(), user, "infra", "admin")).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = InMemoryGrantStore::new();
        let err = store.delete(OrgId::new(), GrantId::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_by_subject() {
        let store = InMemoryGrantStore::new();
        let org = OrgId::new();
        let a = Subject::User(UserId::new());
        let b = Subject::User(UserId::new());
        store.insert(grant(org, a, "infra", "admin")).await.unwrap();
        store.insert(grant(org, a, "cluster-a", "view")).await.unwrap();
        store.insert(grant(org, b, "infra", "admin")).await.unwrap();

        let removed = store.delete_by_subject(org, a).await.unwrap();
        assert_eq!(removed.len(), 2);
        let left = store.query(org, &GrantFilter::default(), &[]).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].subject, b);
    }
}
