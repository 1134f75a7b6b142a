pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Json, Router,
};
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AccessConfig;
use crate::middleware::{
    auth_middleware, metrics_middleware, optional_auth_middleware, tenant_middleware,
};
use crate::services::{
    AdminGuard, Directory, GrantListCache, GrantRepository, GrantStore, HandshakeSettings,
    JwtService, LoginService, OidcExchanger, PageLimits, PrivilegeResolver,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AccessConfig,
    pub directory: Arc<Directory>,
    pub repository: Arc<GrantRepository>,
    pub resolver: Arc<PrivilegeResolver>,
    pub guard: Arc<AdminGuard>,
    pub login: Arc<LoginService>,
    pub jwt: JwtService,
    pub handshake: HandshakeSettings,
    pub login_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire the services together over `store` and an OIDC code exchanger.
    pub fn new(
        config: AccessConfig,
        store: Arc<dyn GrantStore>,
        exchanger: Arc<dyn OidcExchanger>,
    ) -> Result<Self, anyhow::Error> {
        let directory = Arc::new(Directory::new());
        let limits = PageLimits {
            default_limit: config.pagination.default_limit,
            max_limit: config.pagination.max_limit,
        };
        let repository = Arc::new(GrantRepository::new(
            store,
            directory.clone(),
            Arc::new(GrantListCache::with_limits(
                config.cache.grant_list_max_entries,
                Duration::from_secs(config.cache.grant_list_ttl_seconds),
            )),
            limits,
        ));
        let resolver = Arc::new(PrivilegeResolver::new(repository.clone()));
        let guard = Arc::new(AdminGuard::new(repository.clone()));

        let jwt = JwtService::new(&config.session)?;
        let login = Arc::new(LoginService::new(directory.clone(), jwt.clone(), exchanger));

        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let handshake = HandshakeSettings::from_config(&config);

        Ok(Self {
            config,
            directory,
            repository,
            resolver,
            guard,
            login,
            jwt,
            handshake,
            login_rate_limiter,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let login_route = Router::new()
        .route("/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let authenticated = Router::new()
        .route(
            "/grants",
            get(handlers::grants::list_grants)
                .post(handlers::grants::create_grant)
                .patch(handlers::grants::update_grants),
        )
        .route("/grants/:id", delete(handlers::grants::delete_grant))
        .route("/privileges", get(handlers::grants::my_privileges))
        .route("/roles", get(handlers::grants::assignable_roles))
        .route("/logout", post(handlers::auth::logout))
        .route(
            "/users/:id",
            get(handlers::users::get_user).delete(handlers::users::delete_user),
        )
        .route("/groups/:id", delete(handlers::users::delete_group))
        .route(
            "/groups/:id/users/:user_id",
            delete(handlers::users::remove_group_member),
        )
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    // A user holding a one-time password has no session yet.
    let password_route = Router::new()
        .route("/users/:id/password", put(handlers::users::update_password))
        .route_layer(from_fn_with_state(state.clone(), optional_auth_middleware));

    let origins = &state.config.security.allowed_origins;
    let allowed_origins = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| {
            match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                    None
                }
            }
        }))
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/providers", get(handlers::auth::list_providers))
        .route("/login/redirect", get(handlers::auth::neutral_redirect))
        .merge(login_route)
        .merge(authenticated)
        .merge(password_route)
        .route_layer(from_fn(metrics_middleware))
        // Tenant resolution runs before authentication.
        .layer(from_fn_with_state(state.clone(), tenant_middleware))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        )
}

/// Service health check
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
    }))
}
