//! Browser side of an OIDC login.
//!
//! `begin` records the handshake in browser storage and returns the
//! provider's authorize URL. The provider sends the browser back either to
//! the organization's own callback or, for shared providers, to a neutral
//! endpoint on the base domain which forwards to the host named by the
//! `finishLogin` cookie. `complete` checks the anti-forgery token, exchanges
//! the code through the login API and establishes the session. Every terminal
//! transition wipes the handshake keys.

use async_trait::async_trait;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use service_core::observability::traced;
use std::sync::{Arc, Mutex};
use subtle::ConstantTimeEq;
use tracing::instrument;

use crate::config::AccessConfig;
use crate::models::{
    handshake::{HandshakeState, ALL_KEYS},
    Organization, ProviderSummary, Session, VisitedOrg,
};
use crate::services::{
    browser::{BrowserStorage, CookieStore, Navigation},
    error::ServiceError,
    login::{LoginRequest, LoginResponse, LoginService, OidcLogin},
    session_store::SessionStore,
};

pub const CALLBACK_PATH: &str = "/login/callback";
pub const NEUTRAL_REDIRECT_PATH: &str = "/login/redirect";
pub const FINISH_LOGIN_COOKIE: &str = "finishLogin";
pub const VISITED_ORGS_COOKIE: &str = "orgs";

const ANTI_FORGERY_TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakePhase {
    Idle,
    AwaitingRedirect,
    Validating,
    Authenticated,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct HandshakeSettings {
    pub base_domain: String,
    pub scheme: String,
    pub ttl: Duration,
    pub secure_cookies: bool,
}

impl HandshakeSettings {
    pub fn from_config(config: &AccessConfig) -> Self {
        Self {
            base_domain: config.base_domain.clone(),
            scheme: config.public_scheme.clone(),
            ttl: Duration::minutes(config.session.handshake_ttl_minutes),
            secure_cookies: config.secure_cookies(),
        }
    }

    fn neutral_redirect_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.base_domain, NEUTRAL_REDIRECT_PATH)
    }

    /// A cookie readable from the base domain and every organization under it.
    pub fn base_domain_cookie(&self, name: &str, value: String) -> Cookie<'static> {
        Cookie::build((name.to_string(), value))
            .domain(self.base_domain.clone())
            .path("/")
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .build()
    }

    /// Whether `host` is the base domain or one of its organization hosts.
    pub fn owns_host(&self, host: &str) -> bool {
        let host = host.split(':').next().unwrap_or(host);
        host == self.base_domain || host.ends_with(&format!(".{}", self.base_domain))
    }

    /// Where the neutral redirect endpoint sends a browser that started its
    /// login on `origin_host`. `None` for hosts outside the base domain.
    pub fn neutral_forward(&self, origin_host: &str, params: &CallbackParams) -> Option<String> {
        if !self.owns_host(origin_host) {
            tracing::warn!(host = %origin_host, "Refusing to forward login to foreign host");
            return None;
        }
        Some(fan_out_target(&self.scheme, origin_host, params))
    }
}

/// Query parameters the identity provider appends to the redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn success(code: &str, state: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            ..Default::default()
        }
    }

    fn query_string(&self) -> String {
        [
            ("code", &self.code),
            ("state", &self.state),
            ("error", &self.error),
            ("error_description", &self.error_description),
        ]
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| format!("{}={}", k, urlencoding::encode(v))))
        .collect::<Vec<_>>()
        .join("&")
    }

    fn provider_error(&self) -> Option<String> {
        self.error.as_ref().map(|error| {
            self.error_description
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| error.clone())
        })
    }
}

fn fan_out_target(scheme: &str, origin_host: &str, params: &CallbackParams) -> String {
    format!("{}://{}{}?{}", scheme, origin_host, CALLBACK_PATH, params.query_string())
}

pub fn decode_visited_orgs(value: &str) -> Vec<VisitedOrg> {
    URL_SAFE_NO_PAD
        .decode(value)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

pub fn encode_visited_orgs(orgs: &[VisitedOrg]) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(orgs).unwrap_or_default())
}

/// Append `entry` to an encoded visited-organizations list unless its URL is
/// already there.
pub fn with_visited_org(existing: Option<&str>, entry: VisitedOrg) -> String {
    let mut orgs = existing.map(decode_visited_orgs).unwrap_or_default();
    if !orgs.iter().any(|o| o.url == entry.url) {
        orgs.push(entry);
    }
    encode_visited_orgs(&orgs)
}

/// Decode a stored post-login path. Anything but a same-origin path lands
/// on `/`.
fn post_login_location(next: Option<&str>) -> String {
    next.and_then(|n| urlencoding::decode(n).ok())
        .map(|n| n.into_owned())
        .filter(|n| n.starts_with('/') && !n.starts_with("//"))
        .unwrap_or_else(|| "/".to_string())
}

fn anti_forgery_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ANTI_FORGERY_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// The login API as the handshake sees it.
#[async_trait]
pub trait LoginClient: Send + Sync {
    async fn login(&self, request: LoginRequest) -> Result<LoginResponse, ServiceError>;
}

/// Calls the login service in-process for one organization.
pub struct LocalLoginClient {
    service: Arc<LoginService>,
    organization: Organization,
}

impl LocalLoginClient {
    pub fn new(service: Arc<LoginService>, organization: Organization) -> Self {
        Self {
            service,
            organization,
        }
    }
}

#[async_trait]
impl LoginClient for LocalLoginClient {
    async fn login(&self, request: LoginRequest) -> Result<LoginResponse, ServiceError> {
        let outcome = self.service.login(&self.organization, request).await?;
        Ok(LoginResponse::from(&outcome))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Calls `POST /login` on an organization host.
pub struct HttpLoginClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLoginClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl LoginClient for HttpLoginClient {
    async fn login(&self, request: LoginRequest) -> Result<LoginResponse, ServiceError> {
        let response = traced(self.client.post(format!("{}/login", self.base_url)))
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("login request failed: {}", e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ServiceError::Internal(anyhow::anyhow!("invalid login response: {}", e)));
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .map(|b| b.error)
            .unwrap_or_else(|_| status.to_string());
        Err(match status.as_u16() {
            400 | 422 => ServiceError::ValidationError(message),
            401 => ServiceError::InvalidCredentials,
            404 => ServiceError::NotFound(message),
            502 => ServiceError::ProviderError(message),
            _ => ServiceError::Internal(anyhow::anyhow!(message)),
        })
    }
}

/// A completed login: the session now in the store, its token, and where to
/// send the browser.
#[derive(Debug, Clone)]
pub struct CompletedLogin {
    pub session: Session,
    pub token: String,
    pub navigation: Navigation,
}

pub struct HandshakeController {
    storage: Arc<dyn BrowserStorage>,
    cookies: Arc<dyn CookieStore>,
    login: Arc<dyn LoginClient>,
    sessions: Arc<SessionStore>,
    settings: HandshakeSettings,
    /// Host the browser is on, e.g. `acme.example.com`.
    origin_host: String,
    phase: Mutex<HandshakePhase>,
}

impl HandshakeController {
    pub fn new(
        storage: Arc<dyn BrowserStorage>,
        cookies: Arc<dyn CookieStore>,
        login: Arc<dyn LoginClient>,
        sessions: Arc<SessionStore>,
        settings: HandshakeSettings,
        origin_host: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            cookies,
            login,
            sessions,
            settings,
            origin_host: origin_host.into(),
            phase: Mutex::new(HandshakePhase::Idle),
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
            .lock()
            .map(|p| p.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }

    fn set_phase(&self, phase: HandshakePhase) {
        let mut guard = self.phase.lock().unwrap_or_else(|p| p.into_inner());
        *guard = phase;
    }

    fn origin(&self) -> String {
        format!("{}://{}", self.settings.scheme, self.origin_host)
    }

    /// The handshake stored in the browser, if one is in flight.
    pub fn pending(&self) -> Option<HandshakeState> {
        HandshakeState::from_lookup(|key| self.storage.get(key))
    }

    /// Start a login with `provider`. Returns the URL to send the browser to.
    /// A handshake already in flight is replaced.
    #[instrument(skip(self, provider), fields(provider_id = %provider.id, origin = %self.origin_host))]
    pub fn begin(&self, provider: &ProviderSummary, next: Option<&str>) -> String {
        let token = anti_forgery_token();

        let (redirect_url, org_hint) = if provider.managed {
            let mut cookie = self
                .settings
                .base_domain_cookie(FINISH_LOGIN_COOKIE, self.origin_host.clone());
            cookie.set_max_age(time::Duration::minutes(self.settings.ttl.num_minutes()));
            self.cookies.set(cookie);
            (self.settings.neutral_redirect_url(), Some(self.origin_host.clone()))
        } else {
            (format!("{}{}", self.origin(), CALLBACK_PATH), None)
        };

        let state = HandshakeState {
            provider_id: provider.id,
            anti_forgery_token: token.clone(),
            redirect_url: redirect_url.clone(),
            post_login_path: next.map(|n| urlencoding::encode(n).into_owned()),
            finish_login_org_hint: org_hint,
            started_at: Utc::now(),
        };
        self.clear_keys();
        for (key, value) in state.to_entries() {
            self.storage.set(key, value);
        }
        self.set_phase(HandshakePhase::AwaitingRedirect);

        tracing::info!(managed = provider.managed, "Login handshake started");

        let scopes = provider
            .scopes
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("+");
        format!(
            "{}?redirect_uri={}&client_id={}&response_type=code&scope={}&state={}",
            provider.auth_url,
            urlencoding::encode(&redirect_url),
            urlencoding::encode(&provider.client_id),
            scopes,
            token
        )
    }

    /// On the base domain: hand the provider's redirect to the host that
    /// started the login. `None` when no `finishLogin` cookie names a host
    /// under the base domain.
    pub fn forward_from_neutral(&self, params: &CallbackParams) -> Option<Navigation> {
        let cookie = self.cookies.get(FINISH_LOGIN_COOKIE)?;
        self.cookies.remove(FINISH_LOGIN_COOKIE);

        self.settings
            .neutral_forward(cookie.value(), params)
            .map(Navigation::to)
    }

    /// Finish the login the provider redirected back for.
    #[instrument(skip(self, params), fields(origin = %self.origin_host))]
    pub async fn complete(&self, params: CallbackParams) -> Result<CompletedLogin, ServiceError> {
        self.set_phase(HandshakePhase::Validating);
        let result = self.validate_and_exchange(params).await;
        self.clear_keys();

        match &result {
            Ok(completed) => {
                tracing::info!(user_id = %completed.session.user_id, "Login handshake completed");
                self.set_phase(HandshakePhase::Authenticated);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Login handshake failed");
                self.set_phase(HandshakePhase::Failed(e.to_string()));
            }
        }
        result
    }

    async fn validate_and_exchange(
        &self,
        params: CallbackParams,
    ) -> Result<CompletedLogin, ServiceError> {
        let state = self.pending().ok_or(ServiceError::AntiForgeryMismatch)?;

        let returned = params.state.as_deref().unwrap_or_default();
        if !bool::from(returned.as_bytes().ct_eq(state.anti_forgery_token.as_bytes())) {
            return Err(ServiceError::AntiForgeryMismatch);
        }

        if Utc::now() - state.started_at > self.settings.ttl {
            return Err(ServiceError::HandshakeExpired);
        }

        if let Some(message) = params.provider_error() {
            return Err(ServiceError::ProviderError(message));
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::ProviderError("missing authorization code".into()))?;

        let response = self
            .login
            .login(LoginRequest::Oidc(OidcLogin {
                provider_id: state.provider_id,
                code,
                redirect_url: state.redirect_url.clone(),
            }))
            .await?;

        let (Some(token), Some(organization_id), Some(expires_at)) =
            (response.access_key, response.organization_id, response.expires)
        else {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "login response did not include a session"
            )));
        };

        let session = Session {
            user_id: response.user_id,
            organization_id,
            expires_at,
        };
        self.sessions.establish(session.clone());
        self.remember_visited_org(VisitedOrg {
            url: self.origin_host.clone(),
            name: response.organization_name.unwrap_or_default(),
        });

        Ok(CompletedLogin {
            session,
            token,
            navigation: Navigation::to(post_login_location(state.post_login_path.as_deref())),
        })
    }

    fn remember_visited_org(&self, entry: VisitedOrg) {
        let existing = self.cookies.get(VISITED_ORGS_COOKIE);
        let value = with_visited_org(existing.as_ref().map(|c| c.value()), entry);
        self.cookies
            .set(self.settings.base_domain_cookie(VISITED_ORGS_COOKIE, value));
    }

    pub fn visited_orgs(&self) -> Vec<VisitedOrg> {
        self.cookies
            .get(VISITED_ORGS_COOKIE)
            .map(|c| decode_visited_orgs(c.value()))
            .unwrap_or_default()
    }

    fn clear_keys(&self) {
        for key in ALL_KEYS {
            self.storage.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{handshake::KEY_STATE, Provider, ProviderKind};
    use crate::services::{
        browser::{MemoryCookies, MemoryStorage},
        directory::Directory,
        grant_cache::GrantListCache,
        jwt::JwtService,
        oidc::MockOidcExchanger,
    };

    const BASE: &str = "example.com";

    struct Fixture {
        storage: Arc<MemoryStorage>,
        cookies: Arc<MemoryCookies>,
        sessions: Arc<SessionStore>,
        exchanger: Arc<MockOidcExchanger>,
        login: Arc<LoginService>,
        org: Organization,
        shared: ProviderSummary,
        own: ProviderSummary,
    }

    async fn fixture() -> Fixture {
        let directory = Arc::new(Directory::new());
        let org = directory.create_organization("Acme", "acme").await.unwrap();
        let shared = directory
            .add_provider(Provider::new(None, "google", ProviderKind::Google, "accounts.google.com", "g-client", "g-secret"))
            .await
            .unwrap();
        let own = directory
            .add_provider(Provider::new(Some(org.id), "okta", ProviderKind::Okta, "acme.okta.com", "o-client", "o-secret"))
            .await
            .unwrap();

        let exchanger = Arc::new(
            MockOidcExchanger::new()
                .with_identity("code-1", "u1@example.com")
                .with_error("denied", "User is not assigned to the client application."),
        );
        let jwt = JwtService::new(&AccessConfig::local(BASE).session).unwrap();
        let login = Arc::new(LoginService::new(directory, jwt, exchanger.clone()));

        Fixture {
            storage: Arc::new(MemoryStorage::new()),
            cookies: Arc::new(MemoryCookies::new()),
            sessions: Arc::new(SessionStore::new(Arc::new(GrantListCache::new()))),
            exchanger,
            login,
            shared: shared.summary(),
            own: own.summary(),
            org,
        }
    }

    impl Fixture {
        fn controller(&self, host: &str) -> HandshakeController {
            self.controller_with_ttl(host, Duration::minutes(10))
        }

        fn controller_with_ttl(&self, host: &str, ttl: Duration) -> HandshakeController {
            let mut settings = HandshakeSettings::from_config(&AccessConfig::local(BASE));
            settings.ttl = ttl;
            HandshakeController::new(
                self.storage.clone(),
                self.cookies.clone(),
                Arc::new(LocalLoginClient::new(self.login.clone(), self.org.clone())),
                self.sessions.clone(),
                settings,
                host,
            )
        }

        fn handshake_keys_cleared(&self) -> bool {
            ALL_KEYS.iter().all(|k| self.storage.get(k).is_none())
        }
    }

    fn query_param(url: &str, name: &str) -> Option<String> {
        let query = url.split_once('?')?.1;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == name).then(|| urlencoding::decode(v).ok().map(|v| v.into_owned()))?
        })
    }

    #[tokio::test]
    async fn test_org_provider_redirects_to_own_callback() {
        let f = fixture().await;
        let controller = f.controller("acme.example.com");

        let url = controller.begin(&f.own, None);
        assert!(url.starts_with("https://acme.okta.com/oauth2/v1/authorize?"));
        assert_eq!(
            query_param(&url, "redirect_uri").as_deref(),
            Some("https://acme.example.com/login/callback")
        );
        assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
        assert!(url.contains("scope=openid+email+groups+offline_access"));
        assert_eq!(query_param(&url, "state"), f.storage.get(KEY_STATE));
        assert!(f.cookies.get(FINISH_LOGIN_COOKIE).is_none());
        assert_eq!(controller.phase(), HandshakePhase::AwaitingRedirect);
    }

    #[tokio::test]
    async fn test_shared_provider_sets_finish_login_cookie_to_origin_host() {
        let f = fixture().await;
        let controller = f.controller("acme.example.com");

        let url = controller.begin(&f.shared, None);
        assert_eq!(
            query_param(&url, "redirect_uri").as_deref(),
            Some("https://example.com/login/redirect")
        );

        let cookie = f.cookies.get(FINISH_LOGIN_COOKIE).unwrap();
        assert_eq!(cookie.value(), "acme.example.com");
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[tokio::test]
    async fn test_shared_provider_login_through_neutral_redirect() {
        let f = fixture().await;
        let on_org = f.controller("acme.example.com");
        let on_base = f.controller(BASE);

        let url = on_org.begin(&f.shared, Some("/destinations?tab=all"));
        let state = query_param(&url, "state").unwrap();

        let forwarded = on_base
            .forward_from_neutral(&CallbackParams::success("code-1", &state))
            .unwrap();
        assert!(forwarded
            .location
            .starts_with("https://acme.example.com/login/callback?code=code-1&state="));
        assert!(f.cookies.get(FINISH_LOGIN_COOKIE).is_none());

        let params = CallbackParams {
            code: query_param(&forwarded.location, "code"),
            state: query_param(&forwarded.location, "state"),
            ..Default::default()
        };
        let completed = on_org.complete(params).await.unwrap();

        assert_eq!(completed.navigation.location, "/destinations?tab=all");
        assert_eq!(on_org.phase(), HandshakePhase::Authenticated);
        assert_eq!(f.sessions.current(), Some(completed.session.clone()));
        assert_eq!(completed.session.organization_id, f.org.id);
        assert!(f.handshake_keys_cleared());
        assert_eq!(
            f.exchanger.exchanges(),
            vec![("code-1".to_string(), "https://example.com/login/redirect".to_string())]
        );
        assert_eq!(
            on_org.visited_orgs(),
            vec![VisitedOrg {
                url: "acme.example.com".into(),
                name: "Acme".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_state_mismatch_fails_without_exchange() {
        let f = fixture().await;
        let controller = f.controller("acme.example.com");
        controller.begin(&f.own, None);

        let err = controller
            .complete(CallbackParams::success("code-1", "forged"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::AntiForgeryMismatch));
        assert!(matches!(controller.phase(), HandshakePhase::Failed(_)));
        assert!(f.exchanger.exchanges().is_empty());
        assert!(f.sessions.current().is_none());
        assert!(f.handshake_keys_cleared());
    }

    #[tokio::test]
    async fn test_callback_without_handshake_is_rejected() {
        let f = fixture().await;
        let err = f
            .controller("acme.example.com")
            .complete(CallbackParams::success("code-1", "anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AntiForgeryMismatch));
    }

    #[tokio::test]
    async fn test_provider_error_surfaces_verbatim() {
        let f = fixture().await;
        let controller = f.controller("acme.example.com");
        let state = query_param(&controller.begin(&f.own, None), "state").unwrap();

        let err = controller
            .complete(CallbackParams::success("denied", &state))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User is not assigned to the client application.");
        assert_eq!(
            controller.phase(),
            HandshakePhase::Failed("User is not assigned to the client application.".into())
        );
        assert!(f.handshake_keys_cleared());
    }

    #[tokio::test]
    async fn test_provider_error_parameter_is_terminal() {
        let f = fixture().await;
        let controller = f.controller("acme.example.com");
        let state = query_param(&controller.begin(&f.own, None), "state").unwrap();

        let err = controller
            .complete(CallbackParams {
                state: Some(state),
                error: Some("access_denied".into()),
                error_description: Some("The user canceled the login.".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "The user canceled the login.");
        assert!(f.exchanger.exchanges().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_handshake_expires() {
        let f = fixture().await;
        let controller = f.controller_with_ttl("acme.example.com", Duration::zero());
        let state = query_param(&controller.begin(&f.own, None), "state").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let err = controller
            .complete(CallbackParams::success("code-1", &state))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::HandshakeExpired));
    }

    #[tokio::test]
    async fn test_new_begin_replaces_previous_handshake() {
        let f = fixture().await;
        let controller = f.controller("acme.example.com");
        let first = query_param(&controller.begin(&f.own, None), "state").unwrap();
        let second = query_param(&controller.begin(&f.own, None), "state").unwrap();
        assert_ne!(first, second);

        let err = controller
            .complete(CallbackParams::success("code-1", &first))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AntiForgeryMismatch));
    }

    #[tokio::test]
    async fn test_foreign_finish_login_host_is_ignored() {
        let f = fixture().await;
        f.cookies.set(Cookie::new(FINISH_LOGIN_COOKIE, "evil.test"));
        let on_base = f.controller(BASE);
        assert!(on_base
            .forward_from_neutral(&CallbackParams::success("code-1", "s"))
            .is_none());
        assert!(f.cookies.get(FINISH_LOGIN_COOKIE).is_none());
    }

    #[test]
    fn test_neutral_forward_stays_under_base_domain() {
        let settings = HandshakeSettings::from_config(&AccessConfig::local(BASE));
        let params = CallbackParams::success("code-1", "s");

        let target = settings.neutral_forward(&format!("acme.{}", BASE), &params).unwrap();
        assert_eq!(target, format!("https://acme.{}/login/callback?code=code-1&state=s", BASE));
        assert!(settings.neutral_forward("evil.test", &params).is_none());
        assert!(settings.neutral_forward(&format!("{}.evil.test", BASE), &params).is_none());
    }

    #[test]
    fn test_post_login_location() {
        assert_eq!(post_login_location(None), "/");
        assert_eq!(post_login_location(Some("%2Fdestinations")), "/destinations");
        assert_eq!(post_login_location(Some("%2F%2Fevil.test")), "/");
        assert_eq!(post_login_location(Some("https%3A%2F%2Fevil.test")), "/");
    }

    #[test]
    fn test_visited_orgs_deduplicated_by_url() {
        let acme = VisitedOrg {
            url: "acme.example.com".into(),
            name: "Acme".into(),
        };
        let once = with_visited_org(None, acme.clone());
        let twice = with_visited_org(Some(&once), acme.clone());
        assert_eq!(decode_visited_orgs(&twice), vec![acme]);
        assert!(decode_visited_orgs("not base64!").is_empty());
    }
}
