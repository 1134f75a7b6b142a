//! Shared setup for access-service integration tests.
//!
//! Builds the full router over in-memory storage and drives it with
//! `oneshot`, addressing requests to `acme.example.com`.

#![allow(dead_code)]

use access_service::{
    build_router,
    config::AccessConfig,
    models::{
        grant::{ADMIN_PRIVILEGE, ORG_RESOURCE},
        Credential, NewGrant, Organization, Subject, User,
    },
    services::{InMemoryGrantStore, MockOidcExchanger},
    utils::{hash_password, Password},
    AppState,
};
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const BASE_DOMAIN: &str = "example.com";
pub const ORG_DOMAIN: &str = "acme";
pub const ADMIN_PASSWORD: &str = "admin-password-1";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl TestResponse {
    /// Every `Set-Cookie` header value.
    pub fn cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect()
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub org: Organization,
    pub admin: User,
    pub admin_token: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(MockOidcExchanger::new()).await
    }

    /// One organization `acme` with an admin user holding `infra/admin`.
    pub async fn spawn_with(exchanger: MockOidcExchanger) -> Self {
        let config = AccessConfig::local(BASE_DOMAIN);
        let state = AppState::new(
            config,
            Arc::new(InMemoryGrantStore::new()),
            Arc::new(exchanger),
        )
        .expect("Failed to build app state");

        let org = state
            .directory
            .create_organization("Acme", ORG_DOMAIN)
            .await
            .expect("Failed to create organization");

        let admin = seed_user(&state, &org, "admin@acme.com", Some(ADMIN_PASSWORD)).await;
        state
            .repository
            .create(
                org.id,
                NewGrant::new(Subject::User(admin.id), ORG_RESOURCE, ADMIN_PRIVILEGE),
                None,
            )
            .await
            .expect("Failed to grant admin");
        let (_, admin_token) = state
            .jwt
            .issue(admin.id, org.id)
            .expect("Failed to issue token");

        let router = build_router(state.clone());

        TestApp {
            state,
            router,
            org,
            admin,
            admin_token,
        }
    }

    pub fn host(&self) -> String {
        format!("{}.{}", ORG_DOMAIN, BASE_DOMAIN)
    }

    pub async fn create_user(&self, name: &str, password: Option<&str>) -> User {
        seed_user(&self.state, &self.org, name, password).await
    }

    pub async fn grant(&self, subject: Subject, resource: &str, privilege: &str) {
        self.state
            .repository
            .create(self.org.id, NewGrant::new(subject, resource, privilege), None)
            .await
            .expect("Failed to create grant");
    }

    pub fn token_for(&self, user: &User) -> String {
        let (_, token) = self
            .state
            .jwt
            .issue(user.id, self.org.id)
            .expect("Failed to issue token");
        token
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, self.host());

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

async fn seed_user(
    state: &AppState,
    org: &Organization,
    name: &str,
    password: Option<&str>,
) -> User {
    let user = state
        .directory
        .create_user(org.id, name)
        .await
        .expect("Failed to create user");

    if let Some(password) = password {
        let hash = hash_password(&Password::new(password)).expect("Failed to hash password");
        state
            .directory
            .set_credential(
                org.id,
                Credential {
                    user_id: user.id,
                    password_hash: hash.into_string(),
                    one_time_password: false,
                },
            )
            .await
            .expect("Failed to set credential");
    }
    user
}
