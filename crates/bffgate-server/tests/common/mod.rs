//! Common test utilities for integration tests.
//!
//! A [`TestGateway`] wires the real router to a wiremock identity provider,
//! a wiremock upstream API and an in-memory session store. Requests go
//! through `tower::ServiceExt::oneshot`, so cookies are passed by hand.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, header},
};
use axum_extra::extract::cookie::Key;
use bffgate_oauth::{OidcClient, OidcConfig};
use bffgate_server::{AppState, Server, ServerConfig};
use bffgate_session::{
    MemorySessionStore, Session, SessionId, SessionStore, StoreConfig, TokenSet,
};
use chrono::{DateTime, Utc};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "bff-test";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Gateway under test plus its doubles.
pub struct TestGateway {
    pub idp: MockServer,
    pub upstream: MockServer,
    pub store: Arc<MemorySessionStore>,
    pub state: AppState,
    router: Router,
}

/// Cookies and state from a started login.
pub struct PendingLogin {
    pub state: String,
    pub pkce_cookie: String,
}

/// A browser holding a session.
pub struct Browser {
    pub session_id: String,
    pub csrf_token: String,
}

impl Browser {
    pub fn cookie_header(&self) -> String {
        format!("bff_session={}", self.session_id)
    }

    pub fn id(&self) -> SessionId {
        SessionId::new(self.session_id.clone())
    }
}

impl TestGateway {
    /// Start a gateway with default test configuration.
    pub async fn start() -> Self {
        Self::start_with(|config| config).await
    }

    /// Start a gateway, adjusting the server config first.
    pub async fn start_with(customize: impl FnOnce(ServerConfig) -> ServerConfig) -> Self {
        Self::start_with_store(StoreConfig::new(), customize).await
    }

    /// Start a gateway with a specific session store configuration.
    pub async fn start_with_store(
        store_config: StoreConfig,
        customize: impl FnOnce(ServerConfig) -> ServerConfig,
    ) -> Self {
        let idp = MockServer::start().await;
        let upstream = MockServer::start().await;
        mount_discovery(&idp, true).await;

        let oidc_config = OidcConfig::new(
            idp.uri().parse().unwrap(),
            CLIENT_ID,
            "http://localhost:8080/auth/callback".parse().unwrap(),
        )
        .with_timeout(Duration::from_secs(2));
        let oidc = OidcClient::new(oidc_config).unwrap();

        let session_ttl = store_config.ttl;
        let store = Arc::new(MemorySessionStore::new(store_config));

        let config = ServerConfig::new(format!("{}/v1", upstream.uri()).parse().unwrap())
            .with_request_logging(false)
            .with_secure_cookies(false)
            .with_upstream_timeout(Duration::from_millis(500))
            .with_refresh_lock(None)
            .with_post_logout_redirect_uri("http://localhost:8080/".parse().unwrap())
            .with_session_ttl(session_ttl);
        let config = customize(config);

        let state = AppState::new(config, oidc, store.clone(), Key::generate()).unwrap();
        let router = Server::new(state.clone()).router();

        Self {
            idp,
            upstream,
            store,
            state,
            router,
        }
    }

    /// Send one request through the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        self.send(request(Method::GET, uri, cookie, None, Body::empty()))
            .await
    }

    /// Mount a token endpoint answering the authorization code grant.
    pub async fn mount_code_exchange(&self, body: serde_json::Value, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(expected_calls)
            .mount(&self.idp)
            .await;
    }

    /// Mount a token endpoint answering the refresh grant.
    pub async fn mount_refresh(&self, template: ResponseTemplate, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(template)
            .expect(expected_calls)
            .mount(&self.idp)
            .await;
    }

    /// `GET /auth/login` and capture what the callback needs.
    pub async fn begin_login(&self, return_to: Option<&str>) -> PendingLogin {
        let uri = match return_to {
            Some(target) => format!("/auth/login?return_to={}", target),
            None => "/auth/login".to_string(),
        };
        let response = self.get(&uri, None).await;
        assert_eq!(response.status(), 302, "login should redirect");

        let location = location(&response);
        let state = query_param(&location, "state").expect("state in authorization URL");
        let pkce_cookie = set_cookies(&response)
            .remove("bff_pkce")
            .expect("login cookie set");

        PendingLogin { state, pkce_cookie }
    }

    /// Run the callback for a pending login.
    pub async fn callback(&self, pending: &PendingLogin, code: &str, state: &str) -> Response<Body> {
        let uri = format!("/auth/callback?code={}&state={}", code, state);
        let cookie = format!("bff_pkce={}", pending.pkce_cookie);
        self.get(&uri, Some(&cookie)).await
    }

    /// Full login with a mocked token endpoint; returns the browser's cookies.
    pub async fn login(&self) -> Browser {
        self.mount_code_exchange(token_json("at-login", Some("rt-login"), 3600), 1)
            .await;

        let pending = self.begin_login(None).await;
        let response = self.callback(&pending, "code-1", &pending.state).await;
        assert_eq!(response.status(), 200, "callback should succeed");

        let cookies = set_cookies(&response);
        Browser {
            session_id: cookies["bff_session"].clone(),
            csrf_token: cookies["bff_csrf"].clone(),
        }
    }

    /// Put a session with the given tokens straight into the store.
    pub async fn seed_session(&self, tokens: TokenSet) -> Browser {
        let session = Session::issue(tokens);
        self.store.create(&session).await.unwrap();
        Browser {
            session_id: session.id().as_str().to_string(),
            csrf_token: session.csrf_token().to_string(),
        }
    }
}

/// Build a request with optional cookie and CSRF header.
pub fn request(
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    csrf: Option<&str>,
    body: Body,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    if let Some(csrf) = csrf {
        builder = builder.header(CSRF_HEADER, csrf);
    }
    builder.body(body).unwrap()
}

pub async fn mount_discovery(idp: &MockServer, with_end_session: bool) {
    let base = idp.uri();
    let mut doc = serde_json::json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "userinfo_endpoint": format!("{base}/userinfo"),
    });
    if with_end_session {
        doc["end_session_endpoint"] = serde_json::json!(format!("{base}/logout"));
    }

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc))
        .mount(idp)
        .await;
}

/// Token endpoint response body.
pub fn token_json(access: &str, refresh: Option<&str>, expires_in: u64) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "id_token": "id-token-1",
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = serde_json::json!(refresh);
    }
    body
}

/// Token set expiring `expires_in` seconds from now (negative for expired).
pub fn tokens(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenSet {
    let expires_at = DateTime::from_timestamp(Utc::now().timestamp() + expires_in, 0).unwrap();
    TokenSet::new(
        access,
        refresh.map(str::to_string),
        Some("id-token-1".to_string()),
        expires_at,
    )
}

/// `name -> value` for every `Set-Cookie` header.
pub fn set_cookies(response: &Response<Body>) -> HashMap<String, String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Full `Set-Cookie` header for `name`.
pub fn set_cookie_header(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", name)))
        .map(str::to_string)
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("Location header")
        .to_string()
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
