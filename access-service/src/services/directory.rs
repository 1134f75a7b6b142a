//! Organizations, users, groups, identity providers and local credentials.
//!
//! Everything except shared providers is scoped to one organization. The
//! directory is the source of truth for whether a grant subject exists and
//! which groups a user belongs to.

use crate::models::{
    organization::is_valid_domain, user::LOCAL_PROVIDER_NAME, Credential, ForgottenDomain, Group,
    GroupId, OrgId, Organization, Provider, ProviderId, Subject, User, UserId,
};
use crate::services::error::ServiceError;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct DirectoryState {
    organizations: HashMap<OrgId, Organization>,
    users: HashMap<UserId, User>,
    groups: HashMap<GroupId, Group>,
    providers: HashMap<ProviderId, Provider>,
    credentials: HashMap<UserId, Credential>,
}

#[derive(Default)]
pub struct Directory {
    state: RwLock<DirectoryState>,
    /// Bumped on every group membership change.
    membership_version: AtomicU64,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn membership_version(&self) -> u64 {
        self.membership_version.load(Ordering::Acquire)
    }

    fn memberships_changed(&self) {
        self.membership_version.fetch_add(1, Ordering::AcqRel);
    }

    // Organizations

    pub async fn create_organization(
        &self,
        name: &str,
        domain: &str,
    ) -> Result<Organization, ServiceError> {
        if !is_valid_domain(domain) {
            return Err(ServiceError::ValidationError(format!(
                "invalid organization domain '{domain}'"
            )));
        }

        let mut state = self.state.write().await;
        if state.organizations.values().any(|o| o.domain == domain) {
            return Err(ServiceError::Conflict(
                format!("organization domain '{domain}'"),
                None,
            ));
        }

        let org = Organization::new(name, domain);
        state.organizations.insert(org.id, org.clone());
        tracing::info!(org_id = %org.id, domain = %org.domain, "Organization created");
        Ok(org)
    }

    pub async fn organization(&self, id: OrgId) -> Option<Organization> {
        self.state.read().await.organizations.get(&id).cloned()
    }

    pub async fn organization_by_domain(&self, domain: &str) -> Option<Organization> {
        self.state
            .read()
            .await
            .organizations
            .values()
            .find(|o| o.domain == domain)
            .cloned()
    }

    /// Organizations where `email` has an account, most recently used first.
    pub async fn forgotten_domains_for_email(&self, email: &str) -> Vec<ForgottenDomain> {
        let state = self.state.read().await;
        let mut found: Vec<ForgottenDomain> = state
            .users
            .values()
            .filter(|u| u.name.eq_ignore_ascii_case(email))
            .filter_map(|u| {
                state.organizations.get(&u.org_id).map(|org| ForgottenDomain {
                    organization_name: org.name.clone(),
                    organization_domain: org.domain.clone(),
                    last_seen_at: u.last_seen_at,
                })
            })
            .collect();
        found.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        found
    }

    // Users

    pub async fn create_user(&self, org_id: OrgId, name: &str) -> Result<User, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::ValidationError("user name is required".into()));
        }

        let mut state = self.state.write().await;
        if !state.organizations.contains_key(&org_id) {
            return Err(ServiceError::not_found("organization"));
        }
        if state
            .users
            .values()
            .any(|u| u.org_id == org_id && u.name.eq_ignore_ascii_case(name))
        {
            return Err(ServiceError::Conflict(format!("user '{name}'"), None));
        }

        let user = User::new(org_id, name);
        state.users.insert(user.id, user.clone());
        tracing::info!(org_id = %org_id, user_id = %user.id, "User created");
        Ok(user)
    }

    pub async fn user(&self, org_id: OrgId, id: UserId) -> Option<User> {
        self.state
            .read()
            .await
            .users
            .get(&id)
            .filter(|u| u.org_id == org_id)
            .cloned()
    }

    pub async fn user_by_name(&self, org_id: OrgId, name: &str) -> Option<User> {
        self.state
            .read()
            .await
            .users
            .values()
            .find(|u| u.org_id == org_id && u.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub async fn find_or_create_user(
        &self,
        org_id: OrgId,
        name: &str,
    ) -> Result<User, ServiceError> {
        if let Some(user) = self.user_by_name(org_id, name).await {
            return Ok(user);
        }
        match self.create_user(org_id, name).await {
            // Lost a race with a concurrent login for the same email.
            Err(ServiceError::Conflict(..)) => self
                .user_by_name(org_id, name)
                .await
                .ok_or_else(|| ServiceError::not_found("user")),
            other => other,
        }
    }

    /// Note that `provider_name` authenticated the user just now.
    pub async fn record_login(
        &self,
        org_id: OrgId,
        user_id: UserId,
        provider_name: &str,
    ) -> Result<User, ServiceError> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .filter(|u| u.org_id == org_id)
            .ok_or_else(|| ServiceError::not_found("user"))?;

        user.provider_names.insert(provider_name.to_string());
        user.last_seen_at = Some(Utc::now());
        Ok(user.clone())
    }

    /// Detach an identity provider from a user. A user may not lose the
    /// local password provider when it is their only way to sign in.
    pub async fn remove_provider_name(
        &self,
        org_id: OrgId,
        user_id: UserId,
        provider_name: &str,
    ) -> Result<User, ServiceError> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .filter(|u| u.org_id == org_id)
            .ok_or_else(|| ServiceError::not_found("user"))?;

        if provider_name == LOCAL_PROVIDER_NAME
            && user.provider_names.len() == 1
            && user.provider_names.contains(LOCAL_PROVIDER_NAME)
        {
            return Err(ServiceError::ValidationError(
                "cannot remove the only login method for this user".into(),
            ));
        }

        user.provider_names.remove(provider_name);
        let user = user.clone();
        if provider_name == LOCAL_PROVIDER_NAME {
            state.credentials.remove(&user_id);
        }
        Ok(user)
    }

    /// Remove the user, their credential and their group memberships.
    /// Grants are the caller's responsibility.
    pub async fn delete_user(&self, org_id: OrgId, user_id: UserId) -> Result<User, ServiceError> {
        let mut state = self.state.write().await;
        if !state.users.get(&user_id).is_some_and(|u| u.org_id == org_id) {
            return Err(ServiceError::not_found("user"));
        }

        let user = state
            .users
            .remove(&user_id)
            .ok_or_else(|| ServiceError::not_found("user"))?;
        state.credentials.remove(&user_id);
        for group in state.groups.values_mut().filter(|g| g.org_id == org_id) {
            group.members.remove(&user_id);
        }
        drop(state);

        self.memberships_changed();
        tracing::info!(org_id = %org_id, user_id = %user_id, "User deleted");
        Ok(user)
    }

    // Groups

    pub async fn create_group(&self, org_id: OrgId, name: &str) -> Result<Group, ServiceError> {
        let mut state = self.state.write().await;
        if !state.organizations.contains_key(&org_id) {
            return Err(ServiceError::not_found("organization"));
        }
        if state
            .groups
            .values()
            .any(|g| g.org_id == org_id && g.name == name)
        {
            return Err(ServiceError::Conflict(format!("group '{name}'"), None));
        }

        let group = Group::new(org_id, name);
        state.groups.insert(group.id, group.clone());
        Ok(group)
    }

    pub async fn group(&self, org_id: OrgId, id: GroupId) -> Option<Group> {
        self.state
            .read()
            .await
            .groups
            .get(&id)
            .filter(|g| g.org_id == org_id)
            .cloned()
    }

    pub async fn add_member(
        &self,
        org_id: OrgId,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        if !state.users.get(&user_id).is_some_and(|u| u.org_id == org_id) {
            return Err(ServiceError::not_found("user"));
        }
        let group = state
            .groups
            .get_mut(&group_id)
            .filter(|g| g.org_id == org_id)
            .ok_or_else(|| ServiceError::not_found("group"))?;

        if group.members.insert(user_id) {
            drop(state);
            self.memberships_changed();
        }
        Ok(())
    }

    pub async fn remove_member(
        &self,
        org_id: OrgId,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let group = state
            .groups
            .get_mut(&group_id)
            .filter(|g| g.org_id == org_id)
            .ok_or_else(|| ServiceError::not_found("group"))?;

        if group.members.remove(&user_id) {
            drop(state);
            self.memberships_changed();
        }
        Ok(())
    }

    pub async fn delete_group(&self, org_id: OrgId, id: GroupId) -> Result<Group, ServiceError> {
        let mut state = self.state.write().await;
        if !state.groups.get(&id).is_some_and(|g| g.org_id == org_id) {
            return Err(ServiceError::not_found("group"));
        }
        let group = state
            .groups
            .remove(&id)
            .ok_or_else(|| ServiceError::not_found("group"))?;
        drop(state);

        self.memberships_changed();
        tracing::info!(org_id = %org_id, group_id = %id, "Group deleted");
        Ok(group)
    }

    pub async fn groups_of(&self, org_id: OrgId, user_id: UserId) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self
            .state
            .read()
            .await
            .groups
            .values()
            .filter(|g| g.org_id == org_id && g.members.contains(&user_id))
            .map(|g| g.id)
            .collect();
        ids.sort();
        ids
    }

    /// Users a subject stands for: the user itself, or the group's members.
    /// Empty when the subject does not exist in the organization.
    pub async fn users_of(&self, org_id: OrgId, subject: Subject) -> Vec<UserId> {
        let state = self.state.read().await;
        match subject {
            Subject::User(id) => state
                .users
                .get(&id)
                .filter(|u| u.org_id == org_id)
                .map(|u| vec![u.id])
                .unwrap_or_default(),
            Subject::Group(id) => state
                .groups
                .get(&id)
                .filter(|g| g.org_id == org_id)
                .map(|g| g.members.iter().copied().collect())
                .unwrap_or_default(),
        }
    }

    pub async fn subject_exists(&self, org_id: OrgId, subject: Subject) -> bool {
        let state = self.state.read().await;
        match subject {
            Subject::User(id) => state.users.get(&id).is_some_and(|u| u.org_id == org_id),
            Subject::Group(id) => state.groups.get(&id).is_some_and(|g| g.org_id == org_id),
        }
    }

    // Providers

    pub async fn add_provider(&self, provider: Provider) -> Result<Provider, ServiceError> {
        let mut state = self.state.write().await;
        if state
            .providers
            .values()
            .any(|p| p.org_id == provider.org_id && p.name == provider.name)
        {
            return Err(ServiceError::Conflict(
                format!("provider '{}'", provider.name),
                None,
            ));
        }
        state.providers.insert(provider.id, provider.clone());
        tracing::info!(
            provider_id = %provider.id,
            kind = %provider.kind,
            managed = provider.is_managed(),
            "Provider registered"
        );
        Ok(provider)
    }

    pub async fn provider(&self, id: ProviderId) -> Option<Provider> {
        self.state.read().await.providers.get(&id).cloned()
    }

    /// A provider usable from `org_id`: its own, or a shared one.
    pub async fn provider_for(&self, org_id: OrgId, id: ProviderId) -> Option<Provider> {
        self.provider(id)
            .await
            .filter(|p| p.org_id.is_none() || p.org_id == Some(org_id))
    }

    /// Providers offered on the login page of `org_id`, shared ones first.
    pub async fn providers_for(&self, org_id: Option<OrgId>) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self
            .state
            .read()
            .await
            .providers
            .values()
            .filter(|p| p.org_id.is_none() || (org_id.is_some() && p.org_id == org_id))
            .cloned()
            .collect();
        providers.sort_by(|a, b| {
            b.is_managed()
                .cmp(&a.is_managed())
                .then_with(|| a.name.cmp(&b.name))
        });
        providers
    }

    // Credentials

    pub async fn set_credential(
        &self,
        org_id: OrgId,
        credential: Credential,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&credential.user_id)
            .filter(|u| u.org_id == org_id)
            .ok_or_else(|| ServiceError::not_found("user"))?;
        user.provider_names.insert(LOCAL_PROVIDER_NAME.to_string());
        state.credentials.insert(credential.user_id, credential);
        Ok(())
    }

    pub async fn credential(&self, org_id: OrgId, user_id: UserId) -> Option<Credential> {
        let state = self.state.read().await;
        state
            .users
            .get(&user_id)
            .filter(|u| u.org_id == org_id)
            .and_then(|_| state.credentials.get(&user_id).cloned())
    }
}
