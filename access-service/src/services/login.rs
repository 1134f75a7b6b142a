//! Session issuance for password and OIDC logins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;
use validator::{Validate, ValidationErrors};

use crate::models::{
    user::LOCAL_PROVIDER_NAME, Credential, ForgottenDomain, OrgId, Organization, ProviderId,
    Session, User, UserId,
};
use crate::services::{
    directory::Directory,
    error::ServiceError,
    jwt::{JwtService, SessionClaims},
    metrics,
    oidc::OidcExchanger,
};
use crate::utils::{hash_password, verify_dummy, verify_password, Password, PasswordHashString};

/// Body of `POST /login`: exactly one of the two methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoginRequest {
    PasswordCredentials(PasswordCredentials),
    Oidc(OidcLogin),
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            LoginRequest::PasswordCredentials(c) => c.validate(),
            LoginRequest::Oidc(o) => o.validate(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct PasswordCredentials {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

impl fmt::Debug for PasswordCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordCredentials")
            .field("name", &self.name)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OidcLogin {
    #[serde(rename = "providerID")]
    pub provider_id: ProviderId,
    #[validate(length(min = 1, message = "code is required"))]
    pub code: String,
    #[serde(rename = "redirectURL")]
    #[validate(length(min = 1, message = "redirectURL is required"))]
    pub redirect_url: String,
}

/// A signed session and who it is for.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub token: String,
    pub user: User,
    pub organization: Organization,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(IssuedSession),
    /// The password was assigned by an admin and must be replaced first.
    PasswordUpdateRequired { user_id: UserId },
}

/// Body returned by `POST /login`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "organizationID", skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrgId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub password_update_required: bool,
}

impl From<&LoginOutcome> for LoginResponse {
    fn from(outcome: &LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Authenticated(issued) => LoginResponse {
                user_id: issued.user.id,
                name: Some(issued.user.name.clone()),
                organization_id: Some(issued.organization.id),
                organization_name: Some(issued.organization.name.clone()),
                access_key: Some(issued.token.clone()),
                expires: Some(issued.session.expires_at),
                password_update_required: false,
            },
            LoginOutcome::PasswordUpdateRequired { user_id } => LoginResponse {
                user_id: *user_id,
                name: None,
                organization_id: None,
                organization_name: None,
                access_key: None,
                expires: None,
                password_update_required: true,
            },
        }
    }
}

pub struct LoginService {
    directory: Arc<Directory>,
    jwt: JwtService,
    exchanger: Arc<dyn OidcExchanger>,
}

impl LoginService {
    pub fn new(directory: Arc<Directory>, jwt: JwtService, exchanger: Arc<dyn OidcExchanger>) -> Self {
        Self {
            directory,
            jwt,
            exchanger,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub async fn login(
        &self,
        organization: &Organization,
        request: LoginRequest,
    ) -> Result<LoginOutcome, ServiceError> {
        let (method, result) = match request {
            LoginRequest::PasswordCredentials(credentials) => (
                "password",
                self.password_login(organization, credentials).await,
            ),
            LoginRequest::Oidc(oidc) => ("oidc", self.oidc_login(organization, oidc).await),
        };

        let outcome = match &result {
            Ok(LoginOutcome::Authenticated(_)) => "success",
            Ok(LoginOutcome::PasswordUpdateRequired { .. }) => "password_update_required",
            Err(ServiceError::ProviderError(_)) => "provider_error",
            Err(_) => "failure",
        };
        metrics::record_login(method, outcome);
        result
    }

    #[instrument(skip(self, organization, credentials), fields(org_id = %organization.id))]
    async fn password_login(
        &self,
        organization: &Organization,
        credentials: PasswordCredentials,
    ) -> Result<LoginOutcome, ServiceError> {
        let user = self
            .directory
            .user_by_name(organization.id, &credentials.name)
            .await;
        let credential = match &user {
            Some(user) => self.directory.credential(organization.id, user.id).await,
            None => None,
        };
        let (Some(user), Some(credential)) = (user, credential) else {
            verify_dummy(&Password::new(credentials.password));
            return Err(ServiceError::InvalidCredentials);
        };

        verify_password(
            &Password::new(credentials.password),
            &PasswordHashString::new(credential.password_hash),
        )
        .map_err(|_| {
            tracing::warn!(user_id = %user.id, "Password login rejected");
            ServiceError::InvalidCredentials
        })?;

        if credential.one_time_password {
            tracing::info!(user_id = %user.id, "Password update required before login");
            return Ok(LoginOutcome::PasswordUpdateRequired { user_id: user.id });
        }

        self.issue(organization, user.id, LOCAL_PROVIDER_NAME).await
    }

    #[instrument(skip(self, organization, oidc), fields(org_id = %organization.id, provider_id = %oidc.provider_id))]
    async fn oidc_login(
        &self,
        organization: &Organization,
        oidc: OidcLogin,
    ) -> Result<LoginOutcome, ServiceError> {
        let provider = self
            .directory
            .provider_for(organization.id, oidc.provider_id)
            .await
            .ok_or_else(|| ServiceError::not_found("provider"))?;

        let info = self
            .exchanger
            .exchange(&provider, &oidc.code, &oidc.redirect_url)
            .await?;

        let user = self
            .directory
            .find_or_create_user(organization.id, &info.email)
            .await?;

        self.issue(organization, user.id, &provider.name).await
    }

    async fn issue(
        &self,
        organization: &Organization,
        user_id: UserId,
        provider_name: &str,
    ) -> Result<LoginOutcome, ServiceError> {
        let user = self
            .directory
            .record_login(organization.id, user_id, provider_name)
            .await?;
        let (session, token) = self.jwt.issue(user.id, organization.id)?;

        tracing::info!(user_id = %user.id, org_id = %organization.id, provider = %provider_name, "Login succeeded");
        Ok(LoginOutcome::Authenticated(IssuedSession {
            session,
            token,
            user,
            organization: organization.clone(),
        }))
    }

    /// Replace a password after proving the current one. Clears the
    /// must-change flag set by `set_one_time_password`.
    #[instrument(skip(self, current, new_password))]
    pub async fn change_password(
        &self,
        org_id: OrgId,
        user_id: UserId,
        current: &Password,
        new_password: &Password,
    ) -> Result<(), ServiceError> {
        let credential = self
            .directory
            .credential(org_id, user_id)
            .await
            .ok_or(ServiceError::InvalidCredentials)?;
        verify_password(current, &PasswordHashString::new(credential.password_hash))
            .map_err(|_| ServiceError::InvalidCredentials)?;

        self.store_password(org_id, user_id, new_password, false).await?;
        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Assign a password the user must replace on next login.
    #[instrument(skip(self, password))]
    pub async fn set_one_time_password(
        &self,
        org_id: OrgId,
        user_id: UserId,
        password: &Password,
    ) -> Result<(), ServiceError> {
        self.store_password(org_id, user_id, password, true).await?;
        tracing::info!(user_id = %user_id, "One-time password assigned");
        Ok(())
    }

    async fn store_password(
        &self,
        org_id: OrgId,
        user_id: UserId,
        password: &Password,
        one_time_password: bool,
    ) -> Result<(), ServiceError> {
        password
            .check_strength()
            .map_err(ServiceError::ValidationError)?;
        let hash = hash_password(password)?;
        self.directory
            .set_credential(
                org_id,
                Credential {
                    user_id,
                    password_hash: hash.into_string(),
                    one_time_password,
                },
            )
            .await
    }

    pub fn logout(&self, claims: &SessionClaims) {
        self.jwt.revoke(claims);
        tracing::info!(user_id = %claims.sub, "Logged out");
    }

    /// Organizations where `email` has signed in, for the forgot-domain flow.
    pub async fn forgotten_domains(&self, email: &str) -> Vec<ForgottenDomain> {
        self.directory.forgotten_domains_for_email(email).await
    }
}
