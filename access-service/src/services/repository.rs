use crate::models::{
    grant::{ADMIN_PRIVILEGE, ORG_RESOURCE},
    BatchItemFailure, BatchOutcome, Grant, GrantFilter, GrantId, NewGrant, OrgId, Page, Subject,
    UserId,
};
use crate::services::{
    directory::Directory,
    error::ServiceError,
    grant_cache::GrantListCache,
    grant_store::GrantStore,
    metrics::record_grant_mutation,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

/// Authoritative grant operations with cached listings.
///
/// This layer checks grant shape and subject existence. It does not protect
/// the last organization admin; removals that must keep an admin go through
/// [`AdminGuard`](crate::services::admin_guard::AdminGuard).
pub struct GrantRepository {
    store: Arc<dyn GrantStore>,
    directory: Arc<Directory>,
    cache: Arc<GrantListCache>,
    limits: PageLimits,
}

impl GrantRepository {
    pub fn new(
        store: Arc<dyn GrantStore>,
        directory: Arc<Directory>,
        cache: Arc<GrantListCache>,
        limits: PageLimits,
    ) -> Self {
        Self {
            store,
            directory,
            cache,
            limits,
        }
    }

    pub fn cache(&self) -> &Arc<GrantListCache> {
        &self.cache
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    async fn subjects_for(&self, org_id: OrgId, filter: &GrantFilter) -> Vec<Subject> {
        match filter.subject {
            None => vec![],
            Some(Subject::User(user_id)) if filter.include_inherited_from_groups => {
                let mut subjects = vec![Subject::User(user_id)];
                subjects.extend(
                    self.directory
                        .groups_of(org_id, user_id)
                        .await
                        .into_iter()
                        .map(Subject::Group),
                );
                subjects
            }
            Some(subject) => vec![subject],
        }
    }

    #[tracing::instrument(skip(self, filter), fields(org_id = %org_id))]
    pub async fn list(&self, org_id: OrgId, filter: GrantFilter) -> Result<Page<Grant>, ServiceError> {
        let filter = filter.normalized(self.limits.default_limit, self.limits.max_limit);
        let membership_version = self.directory.membership_version();

        if let Some(page) = self.cache.get(org_id, &filter, membership_version) {
            return Ok(page);
        }

        let epoch = self.cache.epoch(org_id);
        let subjects = self.subjects_for(org_id, &filter).await;
        let matching = self.store.query(org_id, &filter, &subjects).await?;
        let page = Page::paginate(matching, filter.page, filter.limit);

        self.cache.put(org_id, filter, page.clone(), membership_version, epoch);
        Ok(page)
    }

    /// Every grant matching `filter`, unpaginated and uncached.
    pub async fn query_all(
        &self,
        org_id: OrgId,
        filter: &GrantFilter,
    ) -> Result<Vec<Grant>, ServiceError> {
        let subjects = self.subjects_for(org_id, filter).await;
        self.store.query(org_id, filter, &subjects).await
    }

    /// Grants held by the user directly or through any of their groups.
    pub async fn effective_grants(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Vec<Grant>, ServiceError> {
        let filter = GrantFilter {
            subject: Some(Subject::User(user_id)),
            include_inherited_from_groups: true,
            show_system: true,
            ..Default::default()
        };
        self.query_all(org_id, &filter).await
    }

    pub async fn org_admin_grants(&self, org_id: OrgId) -> Result<Vec<Grant>, ServiceError> {
        let filter = GrantFilter::for_resource(ORG_RESOURCE).with_privilege(ADMIN_PRIVILEGE);
        self.store.query(org_id, &filter, &[]).await
    }

    pub async fn get(&self, org_id: OrgId, id: GrantId) -> Result<Grant, ServiceError> {
        self.store
            .get(org_id, id)
            .await?
            .ok_or_else(|| ServiceError::not_found("grant"))
    }

    pub async fn find(&self, org_id: OrgId, triple: &NewGrant) -> Result<Option<Grant>, ServiceError> {
        self.store.find(org_id, triple).await
    }

    #[tracing::instrument(skip(self, new), fields(org_id = %org_id, subject = %new.subject, resource = %new.resource, privilege = %new.privilege))]
    pub async fn create(
        &self,
        org_id: OrgId,
        new: NewGrant,
        created_by: Option<UserId>,
    ) -> Result<Grant, ServiceError> {
        new.check().map_err(ServiceError::ValidationError)?;

        if !self.directory.subject_exists(org_id, new.subject).await {
            return Err(ServiceError::not_found(match new.subject {
                Subject::User(_) => "user",
                Subject::Group(_) => "group",
            }));
        }

        let grant = match self.store.insert(Grant::new(org_id, new, created_by)).await {
            Ok(grant) => grant,
            Err(e) => {
                record_grant_mutation("create", "error");
                return Err(e);
            }
        };

        self.cache.invalidate_for(&grant);
        record_grant_mutation("create", "ok");
        tracing::info!(grant_id = %grant.id, "Grant created");
        Ok(grant)
    }

    #[tracing::instrument(skip(self), fields(org_id = %org_id, grant_id = %id))]
    pub async fn remove(&self, org_id: OrgId, id: GrantId) -> Result<Grant, ServiceError> {
        let grant = match self.store.delete(org_id, id).await {
            Ok(grant) => grant,
            Err(e) => {
                record_grant_mutation("remove", "error");
                return Err(e);
            }
        };

        self.cache.invalidate_for(&grant);
        record_grant_mutation("remove", "ok");
        tracing::info!(subject = %grant.subject, "Grant removed");
        Ok(grant)
    }

    /// Delete every grant held by `subject`.
    pub async fn remove_by_subject(
        &self,
        org_id: OrgId,
        subject: Subject,
    ) -> Result<Vec<Grant>, ServiceError> {
        let removed = self.store.delete_by_subject(org_id, subject).await?;
        for grant in &removed {
            self.cache.invalidate_for(grant);
            record_grant_mutation("remove", "ok");
        }
        tracing::info!(org_id = %org_id, subject = %subject, count = removed.len(), "Subject grants removed");
        Ok(removed)
    }

    /// Apply additions, then removals, one at a time. Not a transaction:
    /// an item that fails is reported and the rest still run. A grant that
    /// already exists counts as added.
    #[tracing::instrument(skip_all, fields(org_id = %org_id, adds = to_add.len(), removes = to_remove.len()))]
    pub async fn batch_mutate(
        &self,
        org_id: OrgId,
        to_add: Vec<NewGrant>,
        to_remove: Vec<NewGrant>,
        created_by: Option<UserId>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for new in to_add {
            match self.create(org_id, new.clone(), created_by).await {
                Ok(grant) => outcome.added.push(grant),
                Err(ServiceError::Conflict(..)) => {
                    tracing::debug!(subject = %new.subject, resource = %new.resource, "Grant already present");
                }
                Err(e) => outcome.failures.push(BatchItemFailure {
                    grant: new,
                    error: e.to_string(),
                }),
            }
        }

        for triple in to_remove {
            let result = match self.store.find(org_id, &triple).await {
                Ok(Some(existing)) => self.remove(org_id, existing.id).await,
                Ok(None) => Err(ServiceError::not_found("grant")),
                Err(e) => Err(e),
            };
            match result {
                Ok(grant) => outcome.removed.push(grant.id),
                Err(e) => outcome.failures.push(BatchItemFailure {
                    grant: triple,
                    error: e.to_string(),
                }),
            }
        }

        if outcome.is_partial() {
            tracing::warn!(failures = outcome.failures.len(), "Batch grant update partially applied");
        }
        outcome
    }
}
