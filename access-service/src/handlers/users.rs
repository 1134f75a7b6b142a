use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use std::fmt;
use validator::Validate;

use crate::{
    handlers::require_org_admin,
    middleware::{AuthUser, Tenant},
    models::{GroupId, Subject, UserId},
    utils::{Password, ValidatedJson},
    AppState,
};

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    /// Required unless an admin is assigning a one-time password to someone
    /// else.
    pub old_password: Option<String>,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

impl fmt::Debug for UpdatePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdatePasswordRequest").finish_non_exhaustive()
    }
}

/// Set a password. With `oldPassword` this completes a one-time-password
/// login or is a normal change; without it an admin assigns a one-time
/// password the user must replace.
pub async fn update_password(
    State(state): State<AppState>,
    Tenant(organization): Tenant,
    actor: Option<AuthUser>,
    Path(user_id): Path<UserId>,
    ValidatedJson(req): ValidatedJson<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_password = Password::new(req.password);

    match (req.old_password, actor) {
        (Some(old), _) => {
            state
                .login
                .change_password(organization.id, user_id, &Password::new(old), &new_password)
                .await?;
        }
        (None, Some(actor)) if actor.user_id != user_id => {
            require_org_admin(&state, &actor).await?;
            state
                .login
                .set_one_time_password(organization.id, user_id, &new_password)
                .await?;
        }
        (None, _) => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "oldPassword is required"
            )));
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Delete a user and every grant they hold.
pub async fn delete_user(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(user_id): Path<UserId>,
) -> Result<impl IntoResponse, AppError> {
    require_org_admin(&state, &actor).await?;
    if actor.user_id == user_id {
        return Err(AppError::BadRequest(anyhow::anyhow!("cannot delete yourself")));
    }

    let removed = state
        .guard
        .remove_subject(actor.org_id, Subject::User(user_id))
        .await?;
    tracing::info!(user_id = %user_id, grants = removed.len(), "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a group and every grant it holds.
pub async fn delete_group(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(group_id): Path<GroupId>,
) -> Result<impl IntoResponse, AppError> {
    require_org_admin(&state, &actor).await?;

    let removed = state
        .guard
        .remove_subject(actor.org_id, Subject::Group(group_id))
        .await?;
    tracing::info!(group_id = %group_id, grants = removed.len(), "Group deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_group_member(
    State(state): State<AppState>,
    actor: AuthUser,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
) -> Result<impl IntoResponse, AppError> {
    require_org_admin(&state, &actor).await?;
    state
        .guard
        .remove_member(actor.org_id, group_id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// A user. Anyone may read themselves; admins may read anyone.
pub async fn get_user(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(user_id): Path<UserId>,
) -> Result<impl IntoResponse, AppError> {
    if actor.user_id != user_id {
        require_org_admin(&state, &actor).await?;
    }
    let user = state
        .directory
        .user(actor.org_id, user_id)
        .await
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("user not found")))?;
    Ok(Json(user.sanitized()))
}
