use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

use crate::{
    handlers::require_org_admin,
    middleware::AuthUser,
    models::{
        grant::{ORG_RESOURCE, VIEW_PRIVILEGE},
        GrantFilter, GrantId, GroupId, NewGrant, Subject, UserId,
    },
    services::{BatchResult, RemovalOutcome},
    utils::ValidatedJson,
    AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListGrantsQuery {
    pub resource: Option<String>,
    pub user: Option<UserId>,
    pub group: Option<GroupId>,
    pub privilege: Option<String>,
    pub destination: Option<String>,
    #[serde(default)]
    pub show_inherited: bool,
    #[serde(default)]
    pub show_system: bool,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

impl ListGrantsQuery {
    fn into_filter(self) -> Result<GrantFilter, AppError> {
        let subject = match (self.user, self.group) {
            (Some(_), Some(_)) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "filter by user or group, not both"
                )))
            }
            (Some(user), None) => Some(Subject::User(user)),
            (None, Some(group)) => Some(Subject::Group(group)),
            (None, None) => None,
        };
        Ok(GrantFilter {
            resource: self.resource,
            subject,
            privilege: self.privilege,
            destination: self.destination,
            include_inherited_from_groups: self.show_inherited,
            show_system: self.show_system,
            page: self.page,
            limit: self.limit,
        })
    }
}

/// One grant in a create or batch request: exactly one of `user` and `group`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GrantRequest {
    pub user: Option<UserId>,
    pub group: Option<GroupId>,
    #[validate(length(min = 1, message = "resource is required"))]
    pub resource: String,
    #[validate(length(min = 1, message = "privilege is required"))]
    pub privilege: String,
}

impl TryFrom<GrantRequest> for NewGrant {
    type Error = AppError;

    fn try_from(req: GrantRequest) -> Result<Self, Self::Error> {
        let subject = match (req.user, req.group) {
            (Some(user), None) => Subject::User(user),
            (None, Some(group)) => Subject::Group(group),
            _ => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "exactly one of user or group is required"
                )))
            }
        };
        Ok(NewGrant::new(subject, req.resource, req.privilege))
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGrantsRequest {
    #[serde(default)]
    #[validate(nested)]
    pub grants_to_add: Vec<GrantRequest>,
    #[serde(default)]
    #[validate(nested)]
    pub grants_to_remove: Vec<GrantRequest>,
    /// Proceed even though the batch revokes the caller's own admin access.
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteGrantQuery {
    #[serde(default)]
    pub confirm: bool,
}

fn into_triples(requests: Vec<GrantRequest>) -> Result<Vec<NewGrant>, AppError> {
    requests.into_iter().map(NewGrant::try_from).collect()
}

/// List grants. Admins and viewers of the organization see everything;
/// anyone may list their own grants.
pub async fn list_grants(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListGrantsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = query.into_filter()?;

    let own = filter.subject == Some(Subject::User(user.user_id));
    if !own {
        let allowed = state.resolver.is_org_admin(user.org_id, user.user_id).await?
            || state
                .resolver
                .check(user.org_id, user.user_id, ORG_RESOURCE, VIEW_PRIVILEGE)
                .await?
                .any();
        if !allowed {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "listing grants requires infra view"
            )));
        }
    }

    let page = state.repository.list(user.org_id, filter).await?;
    Ok(Json(page))
}

pub async fn create_grant(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<GrantRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_org_admin(&state, &user).await?;
    let new = NewGrant::try_from(req)?;

    if let Some(note) = state
        .resolver
        .missing_base_advisory(user.org_id, &new.resource)
        .await?
    {
        tracing::info!(resource = %new.resource, "{}", note);
    }

    let grant = state
        .repository
        .create(user.org_id, new, Some(user.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

/// Batch add/remove. Partial failure is still a 200; the body lists what
/// failed. A batch that would revoke the caller's own admin access through a
/// group answers 200 with `applied: false` until repeated with `confirm`.
pub async fn update_grants(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateGrantsRequest>,
) -> Result<Response, AppError> {
    require_org_admin(&state, &user).await?;
    let to_add = into_triples(req.grants_to_add)?;
    let to_remove = into_triples(req.grants_to_remove)?;

    match state
        .guard
        .batch_mutate(user.org_id, Some(user.user_id), to_add, to_remove, req.confirm)
        .await?
    {
        BatchResult::Applied(outcome) => Ok(Json(outcome).into_response()),
        BatchResult::NeedsConfirmation { grants, warning } => Ok(Json(serde_json::json!({
            "applied": false,
            "warning": warning,
            "grants": grants,
        }))
        .into_response()),
    }
}

pub async fn delete_grant(
    State(state): State<AppState>,
    user: AuthUser,
    Path(grant_id): Path<GrantId>,
    Query(query): Query<DeleteGrantQuery>,
) -> Result<Response, AppError> {
    require_org_admin(&state, &user).await?;

    match state
        .guard
        .remove(user.org_id, Some(user.user_id), grant_id, query.confirm)
        .await?
    {
        RemovalOutcome::Removed(_) => Ok(StatusCode::NO_CONTENT.into_response()),
        RemovalOutcome::NeedsConfirmation { grant, warning } => Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "removed": false,
                "warning": warning,
                "grant": grant,
            })),
        )
            .into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResourceQuery {
    pub resource: String,
}

/// What the caller may do on a resource, strongest first.
pub async fn my_privileges(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ResourceQuery>,
) -> Result<impl IntoResponse, AppError> {
    let resolution = state
        .resolver
        .resolve(user.org_id, user.user_id, &query.resource)
        .await?;
    Ok(Json(resolution))
}

/// Roles that can be granted on a resource.
pub async fn assignable_roles(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ResourceQuery>,
) -> impl IntoResponse {
    Json(state.resolver.assignable_roles(&query.resource))
}
