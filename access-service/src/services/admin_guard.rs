//! Keeps every organization administrable.
//!
//! An organization must always hold at least one `infra/admin` grant whose
//! subject stands for a real user: a user, or a group with members. Every
//! removal path that could break that goes through here, checks the state
//! the removal would leave behind, and refuses before anything changes.
//! Guarded mutations are serialized so two concurrent removals cannot each
//! see the other's admin as the survivor.

use crate::models::grant::{ADMIN_PRIVILEGE, ORG_RESOURCE};
use crate::models::{BatchOutcome, Grant, GrantId, GroupId, NewGrant, OrgId, Subject, UserId};
use crate::services::{
    directory::Directory, error::ServiceError, metrics::record_guard_rejection,
    repository::GrantRepository,
};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum RemovalOutcome {
    Removed(Grant),
    /// The actor would lose their own admin access. Nothing was removed;
    /// repeat with confirmation to proceed.
    NeedsConfirmation { grant: Grant, warning: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    Applied(BatchOutcome),
    /// The batch would remove every group admin grant through which the
    /// actor is an admin. Nothing ran; repeat with confirmation to proceed.
    NeedsConfirmation { grants: Vec<Grant>, warning: String },
}

pub const SELF_REMOVAL_WARNING: &str =
    "You are an admin only through this group. Removing it will revoke your own admin access.";

fn is_org_admin(triple: &NewGrant) -> bool {
    triple.resource == ORG_RESOURCE && triple.privilege == ADMIN_PRIVILEGE
}

pub struct AdminGuard {
    repository: Arc<GrantRepository>,
    directory: Arc<Directory>,
    lock: Mutex<()>,
}

impl AdminGuard {
    pub fn new(repository: Arc<GrantRepository>) -> Self {
        Self {
            directory: repository.directory().clone(),
            repository,
            lock: Mutex::new(()),
        }
    }

    /// Whether any of `subjects` resolves to a user that `still_counts`.
    async fn any_resolves(
        &self,
        org_id: OrgId,
        subjects: impl IntoIterator<Item = Subject>,
        still_counts: impl Fn(Subject, UserId) -> bool,
    ) -> bool {
        for subject in subjects {
            let users = self.directory.users_of(org_id, subject).await;
            if users.into_iter().any(|user| still_counts(subject, user)) {
                return true;
            }
        }
        false
    }

    /// Whether `actor` is an admin through one of the `removed` group grants
    /// and through none of the `remaining` admin subjects.
    async fn loses_own_admin(
        &self,
        org_id: OrgId,
        actor: UserId,
        removed: &[Grant],
        remaining: Vec<Subject>,
    ) -> bool {
        let mut in_removed_group = false;
        for grant in removed {
            if let Subject::Group(_) = grant.subject {
                if self.directory.users_of(org_id, grant.subject).await.contains(&actor) {
                    in_removed_group = true;
                    break;
                }
            }
        }
        if !in_removed_group {
            return false;
        }

        let elsewhere = self
            .any_resolves(org_id, remaining, |_, user| user == actor)
            .await;
        if !elsewhere {
            record_guard_rejection("self_removal");
            tracing::info!(actor = %actor, "Removal would revoke actor's own admin access");
        }
        !elsewhere
    }

    fn reject(&self, org_id: OrgId) -> ServiceError {
        record_guard_rejection("last_admin");
        tracing::warn!(org_id = %org_id, "Refusing to remove the last organization admin");
        ServiceError::LastAdminViolation
    }

    /// Remove one grant. Removing an admin grant that no other admin grant
    /// can replace fails with `LastAdminViolation`. Removing a group admin
    /// grant through which `actor` is the only route to admin needs
    /// `confirmed`.
    #[tracing::instrument(skip(self), fields(org_id = %org_id, grant_id = %grant_id))]
    pub async fn remove(
        &self,
        org_id: OrgId,
        actor: Option<UserId>,
        grant_id: GrantId,
        confirmed: bool,
    ) -> Result<RemovalOutcome, ServiceError> {
        let _serialized = self.lock.lock().await;
        let grant = self.repository.get(org_id, grant_id).await?;

        if grant.is_org_admin() {
            let remaining: Vec<Subject> = self
                .repository
                .org_admin_grants(org_id)
                .await?
                .into_iter()
                .filter(|g| g.id != grant.id)
                .map(|g| g.subject)
                .collect();

            if !self.any_resolves(org_id, remaining.clone(), |_, _| true).await {
                return Err(self.reject(org_id));
            }

            if let (Some(actor), false) = (actor, confirmed) {
                if self
                    .loses_own_admin(org_id, actor, std::slice::from_ref(&grant), remaining)
                    .await
                {
                    return Ok(RemovalOutcome::NeedsConfirmation {
                        grant,
                        warning: SELF_REMOVAL_WARNING.to_string(),
                    });
                }
            }
        }

        let removed = self.repository.remove(org_id, grant_id).await?;
        Ok(RemovalOutcome::Removed(removed))
    }

    /// Batch add/remove. If the batch as a whole would leave no admin, it is
    /// rejected before any item runs. If it would take away `actor`'s own
    /// admin access through a group, nothing runs until `confirmed`.
    /// Otherwise it runs best-effort.
    #[tracing::instrument(skip_all, fields(org_id = %org_id))]
    pub async fn batch_mutate(
        &self,
        org_id: OrgId,
        actor: Option<UserId>,
        to_add: Vec<NewGrant>,
        to_remove: Vec<NewGrant>,
        confirmed: bool,
    ) -> Result<BatchResult, ServiceError> {
        let _serialized = self.lock.lock().await;

        if to_remove.iter().any(is_org_admin) {
            let (removed, kept): (Vec<Grant>, Vec<Grant>) = self
                .repository
                .org_admin_grants(org_id)
                .await?
                .into_iter()
                .partition(|g| to_remove.iter().any(|t| g.same_triple(t)));
            let mut survivors: Vec<Subject> = kept.into_iter().map(|g| g.subject).collect();
            survivors.extend(
                to_add
                    .iter()
                    .filter(|n| is_org_admin(n) && n.check().is_ok())
                    .map(|n| n.subject),
            );

            if !self.any_resolves(org_id, survivors.clone(), |_, _| true).await {
                return Err(self.reject(org_id));
            }

            if let (Some(actor), false) = (actor, confirmed) {
                if self.loses_own_admin(org_id, actor, &removed, survivors).await {
                    return Ok(BatchResult::NeedsConfirmation {
                        grants: removed
                            .into_iter()
                            .filter(|g| matches!(g.subject, Subject::Group(_)))
                            .collect(),
                        warning: SELF_REMOVAL_WARNING.to_string(),
                    });
                }
            }
        }

        Ok(BatchResult::Applied(
            self.repository
                .batch_mutate(org_id, to_add, to_remove, actor)
                .await,
        ))
    }

    /// Delete a user or group together with every grant it holds.
    #[tracing::instrument(skip(self), fields(org_id = %org_id, subject = %subject))]
    pub async fn remove_subject(
        &self,
        org_id: OrgId,
        subject: Subject,
    ) -> Result<Vec<Grant>, ServiceError> {
        let _serialized = self.lock.lock().await;

        if !self.directory.subject_exists(org_id, subject).await {
            return Err(ServiceError::not_found(match subject {
                Subject::User(_) => "user",
                Subject::Group(_) => "group",
            }));
        }

        let admins: Vec<Subject> = self
            .repository
            .org_admin_grants(org_id)
            .await?
            .into_iter()
            .map(|g| g.subject)
            .collect();
        let deleted_user = subject.as_user();
        let before = self.any_resolves(org_id, admins.clone(), |_, _| true).await;
        let after = self
            .any_resolves(
                org_id,
                admins.into_iter().filter(|s| *s != subject),
                |_, user| Some(user) != deleted_user,
            )
            .await;
        if before && !after {
            return Err(self.reject(org_id));
        }

        let removed = self.repository.remove_by_subject(org_id, subject).await?;
        match subject {
            Subject::User(id) => {
                self.directory.delete_user(org_id, id).await?;
            }
            Subject::Group(id) => {
                self.directory.delete_group(org_id, id).await?;
            }
        }
        Ok(removed)
    }

    /// Take a user out of a group unless that strands the organization
    /// without an admin. Organizations already without an admin are not
    /// blocked from membership or subject cleanup.
    pub async fn remove_member(
        &self,
        org_id: OrgId,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<(), ServiceError> {
        let _serialized = self.lock.lock().await;

        let admins: Vec<Subject> = self
            .repository
            .org_admin_grants(org_id)
            .await?
            .into_iter()
            .map(|g| g.subject)
            .collect();
        let leaving = Subject::Group(group_id);
        let before = self.any_resolves(org_id, admins.clone(), |_, _| true).await;
        let after = self
            .any_resolves(org_id, admins, |s, u| !(s == leaving && u == user_id))
            .await;
        if before && !after {
            return Err(self.reject(org_id));
        }

        self.directory.remove_member(org_id, group_id, user_id).await
    }
}
