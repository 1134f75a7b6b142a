mod common;

use access_service::models::{Provider, ProviderKind};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::TestApp;

async fn seed_providers(app: &TestApp) {
    app.state
        .directory
        .add_provider(Provider::new(
            None,
            "google",
            ProviderKind::Google,
            "accounts.google.com",
            "shared-client",
            "shared-secret",
        ))
        .await
        .unwrap();
    app.state
        .directory
        .add_provider(Provider::new(
            Some(app.org.id),
            "okta",
            ProviderKind::Okta,
            "acme.okta.com",
            "acme-client",
            "acme-secret",
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_providers_never_expose_secrets() {
    let app = TestApp::spawn().await;
    seed_providers(&app).await;

    let res = app.request(Method::GET, "/providers", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["totalCount"], 2);
    // Shared providers are listed first.
    assert_eq!(res.body["items"][0]["name"], "google");
    assert_eq!(res.body["items"][1]["clientID"], "acme-client");

    let raw = res.body.to_string();
    assert!(!raw.contains("secret"));
}

#[tokio::test]
async fn test_base_domain_lists_only_shared_providers() {
    let app = TestApp::spawn().await;
    seed_providers(&app).await;

    let request = Request::builder()
        .uri("/providers")
        .header(header::HOST, "example.com")
        .body(Body::empty())
        .unwrap();
    let res = app.send(request).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["totalCount"], 1);
    assert_eq!(res.body["items"][0]["name"], "google");
}

#[tokio::test]
async fn test_neutral_redirect_forwards_to_org_host() {
    let app = TestApp::spawn().await;

    let request = Request::builder()
        .uri("/login/redirect?code=abc&state=xyz")
        .header(header::HOST, "example.com")
        .header(header::COOKIE, "finishLogin=acme.example.com")
        .body(Body::empty())
        .unwrap();
    let res = app.send(request).await;

    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(
        res.headers.get(header::LOCATION).unwrap(),
        "https://acme.example.com/login/callback?code=abc&state=xyz"
    );
    // The cookie is consumed.
    assert!(res
        .cookies()
        .iter()
        .any(|c| c.starts_with("finishLogin=") && c.contains("Max-Age=0")));
}

#[tokio::test]
async fn test_neutral_redirect_forwards_provider_errors() {
    let app = TestApp::spawn().await;

    let request = Request::builder()
        .uri("/login/redirect?error=access_denied&error_description=Not%20assigned&state=xyz")
        .header(header::HOST, "example.com")
        .header(header::COOKIE, "finishLogin=acme.example.com")
        .body(Body::empty())
        .unwrap();
    let res = app.send(request).await;

    assert_eq!(res.status, StatusCode::SEE_OTHER);
    let location = res.headers.get(header::LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with("https://acme.example.com/login/callback?"));
    assert!(location.contains("error=access_denied"));
    assert!(location.contains("error_description=Not%20assigned"));
}

#[tokio::test]
async fn test_neutral_redirect_without_cookie_is_rejected() {
    let app = TestApp::spawn().await;

    let request = Request::builder()
        .uri("/login/redirect?code=abc&state=xyz")
        .header(header::HOST, "example.com")
        .body(Body::empty())
        .unwrap();
    let res = app.send(request).await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_neutral_redirect_refuses_foreign_host() {
    let app = TestApp::spawn().await;

    let request = Request::builder()
        .uri("/login/redirect?code=abc&state=xyz")
        .header(header::HOST, "example.com")
        .header(header::COOKIE, "finishLogin=evil.example.net")
        .body(Body::empty())
        .unwrap();
    let res = app.send(request).await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.headers.get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_assignable_roles_for_org_resource() {
    let app = TestApp::spawn().await;

    let res = app
        .request(Method::GET, "/roles?resource=infra", Some(&app.admin_token), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.to_string().contains("admin"));
}
