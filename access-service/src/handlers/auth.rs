use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use service_core::error::AppError;

use crate::{
    middleware::{AuthUser, Tenant, AUTH_COOKIE},
    models::{Page, ProviderSummary, VisitedOrg},
    services::{
        handshake::{with_visited_org, FINISH_LOGIN_COOKIE, VISITED_ORGS_COOKIE},
        CallbackParams, LoginOutcome, LoginRequest, LoginResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// Password or OIDC login against the organization of the request host.
pub async fn login(
    State(state): State<AppState>,
    Tenant(organization): Tenant,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let outcome = state.login.login(&organization, req).await?;
    let body = LoginResponse::from(&outcome);

    let jar = match &outcome {
        LoginOutcome::Authenticated(issued) => {
            let visited = with_visited_org(
                jar.get(VISITED_ORGS_COOKIE).map(|c| c.value()),
                VisitedOrg {
                    url: format!("{}.{}", organization.domain, state.config.base_domain),
                    name: organization.name.clone(),
                },
            );
            jar.add(
                Cookie::build((AUTH_COOKIE, issued.token.clone()))
                    .path("/")
                    .http_only(true)
                    .secure(state.config.secure_cookies())
                    .same_site(SameSite::Lax)
                    .max_age(time::Duration::minutes(state.jwt.expiry_minutes()))
                    .build(),
            )
            .add(state.handshake.base_domain_cookie(VISITED_ORGS_COOKIE, visited))
        }
        LoginOutcome::PasswordUpdateRequired { .. } => jar,
    };

    Ok((jar, Json(body)))
}

/// Revoke the session token and drop the session cookie.
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    state.login.logout(&user.claims);
    let jar = jar.remove(Cookie::build(AUTH_COOKIE).path("/").build());
    Ok((
        jar,
        Json(serde_json::json!({
            "message": "Logged out successfully",
            "location": "/login"
        })),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvidersQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

/// Providers offered on this host's login page. Secrets are never included.
pub async fn list_providers(
    State(state): State<AppState>,
    tenant: Option<Tenant>,
    Query(query): Query<ProvidersQuery>,
) -> Result<Json<Page<ProviderSummary>>, AppError> {
    let org_id = tenant.map(|Tenant(org)| org.id);
    let summaries: Vec<ProviderSummary> = state
        .directory
        .providers_for(org_id)
        .await
        .iter()
        .map(ProviderSummary::from)
        .collect();

    let pagination = &state.config.pagination;
    let limit = match query.limit {
        0 => pagination.default_limit,
        n => n.min(pagination.max_limit),
    };
    Ok(Json(Page::paginate(summaries, query.page, limit)))
}

/// The single callback registered with shared providers. Sends the browser
/// on to the organization host named by the `finishLogin` cookie.
pub async fn neutral_redirect(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    let host = jar
        .get(FINISH_LOGIN_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("no login in progress")))?;

    let jar = jar.remove(
        state
            .handshake
            .base_domain_cookie(FINISH_LOGIN_COOKIE, String::new()),
    );

    match state.handshake.neutral_forward(&host, &params) {
        Some(target) => {
            tracing::info!(host = %host, "Forwarding shared-provider login");
            Ok((jar, Redirect::to(&target)).into_response())
        }
        None => Ok((
            jar,
            AppError::BadRequest(anyhow::anyhow!("login was started on an unknown host")),
        )
            .into_response()),
    }
}
