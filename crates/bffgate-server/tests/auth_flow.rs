//! Login, callback, logout and session-status integration tests.

mod common;

use axum::body::Body;
use axum::http::{Method, StatusCode};
use common::{TestGateway, json_body, location, query_param, request, set_cookie_header, set_cookies, token_json};
use wiremock::ResponseTemplate;
use wiremock::matchers::{method, path};

#[tokio::test]
async fn test_login_redirects_to_provider_with_pkce() {
    let gateway = TestGateway::start().await;

    let response = gateway.get("/auth/login", None).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = location(&response);
    assert!(location.starts_with(&format!("{}/authorize?", gateway.idp.uri())));
    assert_eq!(query_param(&location, "response_type").as_deref(), Some("code"));
    assert_eq!(query_param(&location, "client_id").as_deref(), Some(common::CLIENT_ID));
    assert_eq!(
        query_param(&location, "code_challenge_method").as_deref(),
        Some("S256")
    );
    assert_eq!(query_param(&location, "code_challenge").unwrap().len(), 43);
    assert!(query_param(&location, "state").is_some());

    let cookie = set_cookie_header(&response, "bff_pkce").unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/auth"));
    assert!(cookie.contains("Max-Age=300"));
}

#[tokio::test]
async fn test_login_reports_unavailable_provider() {
    let gateway = TestGateway::start().await;
    gateway.idp.reset().await;

    let response = gateway.get("/auth/login", None).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["error"], "BFF_IDP_UNAVAILABLE");
}

#[tokio::test]
async fn test_callback_creates_session_and_cookies() {
    let gateway = TestGateway::start().await;
    gateway
        .mount_code_exchange(token_json("at-1", Some("rt-1"), 3600), 1)
        .await;

    let pending = gateway.begin_login(None).await;
    let response = gateway.callback(&pending, "code-1", &pending.state).await;
    assert_eq!(response.status(), StatusCode::OK);

    let session_cookie = set_cookie_header(&response, "bff_session").unwrap();
    assert!(session_cookie.contains("HttpOnly"));
    assert!(session_cookie.contains("SameSite=Lax"));
    assert!(session_cookie.contains("Path=/"));
    assert!(session_cookie.contains("Max-Age=28800"));

    let csrf_cookie = set_cookie_header(&response, "bff_csrf").unwrap();
    assert!(!csrf_cookie.contains("HttpOnly"));

    let cookies = set_cookies(&response);
    assert_eq!(cookies["bff_pkce"], "", "login cookie is cleared");

    let body = json_body(response).await;
    assert_eq!(body["csrf_token"], cookies["bff_csrf"].as_str());
    assert!(body.get("access_token").is_none());

    assert_eq!(gateway.store.len(), 1);
}

#[tokio::test]
async fn test_callback_redirects_to_return_to() {
    let gateway = TestGateway::start().await;
    gateway
        .mount_code_exchange(token_json("at-1", Some("rt-1"), 3600), 1)
        .await;

    let pending = gateway.begin_login(Some("/orders")).await;
    let response = gateway.callback(&pending, "code-1", &pending.state).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/orders");
    assert!(set_cookies(&response).contains_key("bff_session"));
}

#[tokio::test]
async fn test_callback_ignores_foreign_return_to() {
    let gateway = TestGateway::start().await;
    gateway
        .mount_code_exchange(token_json("at-1", Some("rt-1"), 3600), 1)
        .await;

    let pending = gateway.begin_login(Some("//evil.example.com")).await;
    let response = gateway.callback(&pending, "code-1", &pending.state).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_callback_without_login_cookie() {
    let gateway = TestGateway::start().await;
    gateway
        .mount_code_exchange(token_json("at-1", None, 3600), 0)
        .await;

    let response = gateway
        .get("/auth/callback?code=c&state=s", None)
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "BFF_AUTH_STATE_MISSING");
    assert!(gateway.store.is_empty());
}

#[tokio::test]
async fn test_callback_state_mismatch_creates_no_session() {
    let gateway = TestGateway::start().await;
    gateway
        .mount_code_exchange(token_json("at-1", None, 3600), 0)
        .await;

    let pending = gateway.begin_login(None).await;
    let response = gateway.callback(&pending, "code-1", "forged-state").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let cookies = set_cookies(&response);
    assert_eq!(cookies["bff_pkce"], "", "login cookie is cleared on failure");
    assert!(!cookies.contains_key("bff_session"));
    assert_eq!(json_body(response).await["error"], "BFF_AUTH_STATE_MISMATCH");
    assert!(gateway.store.is_empty());
}

#[tokio::test]
async fn test_callback_provider_error() {
    let gateway = TestGateway::start().await;
    let pending = gateway.begin_login(None).await;

    let uri = format!(
        "/auth/callback?error=access_denied&error_description=nope&state={}",
        pending.state
    );
    let cookie = format!("bff_pkce={}", pending.pkce_cookie);
    let response = gateway.get(&uri, Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "BFF_AUTH_IDP_ERROR");
    assert!(!body["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_callback_missing_code() {
    let gateway = TestGateway::start().await;
    let pending = gateway.begin_login(None).await;

    let uri = format!("/auth/callback?state={}", pending.state);
    let cookie = format!("bff_pkce={}", pending.pkce_cookie);
    let response = gateway.get(&uri, Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "BFF_AUTH_CODE_MISSING");
}

#[tokio::test]
async fn test_callback_exchange_failure() {
    let gateway = TestGateway::start().await;
    wiremock::Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "invalid_grant"})),
        )
        .expect(1)
        .mount(&gateway.idp)
        .await;

    let pending = gateway.begin_login(None).await;
    let response = gateway.callback(&pending, "bad-code", &pending.state).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await["error"],
        "BFF_AUTH_TOKEN_EXCHANGE_FAILED"
    );
    assert!(gateway.store.is_empty());
}

#[tokio::test]
async fn test_each_login_gets_distinct_csrf_token() {
    let gateway = TestGateway::start().await;
    gateway
        .mount_code_exchange(token_json("at-1", Some("rt-1"), 3600), 2)
        .await;

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let pending = gateway.begin_login(None).await;
        let response = gateway.callback(&pending, "code", &pending.state).await;
        assert_eq!(response.status(), StatusCode::OK);
        tokens.push(set_cookies(&response)["bff_csrf"].clone());
    }

    assert_ne!(tokens[0], tokens[1]);
    assert_eq!(gateway.store.len(), 2);
}

#[tokio::test]
async fn test_logout_redirects_to_end_session() {
    let gateway = TestGateway::start().await;
    let browser = gateway.login().await;

    let response = gateway
        .send(request(
            Method::POST,
            "/auth/logout",
            Some(&browser.cookie_header()),
            None,
            Body::empty(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = location(&response);
    assert!(location.starts_with(&format!("{}/logout?", gateway.idp.uri())));
    assert_eq!(query_param(&location, "id_token_hint").as_deref(), Some("id-token-1"));
    assert_eq!(
        query_param(&location, "post_logout_redirect_uri").as_deref(),
        Some("http://localhost:8080/")
    );
    assert_eq!(set_cookies(&response)["bff_session"], "");
    assert!(gateway.store.is_empty());
}

#[tokio::test]
async fn test_logout_is_idempotent_and_revokes_cookie() {
    let gateway = TestGateway::start().await;
    let browser = gateway.login().await;
    let cookie = browser.cookie_header();

    let logout = || {
        request(
            Method::POST,
            "/auth/logout",
            Some(&cookie),
            None,
            Body::empty(),
        )
    };

    let first = gateway.send(logout()).await;
    assert_eq!(first.status(), StatusCode::FOUND);

    let second = gateway.send(logout()).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(json_body(second).await["status"], "logged_out");

    let response = gateway.get("/api/orders", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "BFF_SESSION_MISSING");
}

#[tokio::test]
async fn test_logout_without_session() {
    let gateway = TestGateway::start().await;

    let response = gateway
        .send(request(Method::POST, "/auth/logout", None, None, Body::empty()))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "logged_out");
}

#[tokio::test]
async fn test_session_status() {
    let gateway = TestGateway::start().await;

    let anonymous = json_body(gateway.get("/auth/session", None).await).await;
    assert_eq!(anonymous["authenticated"], false);
    assert!(anonymous.get("csrf_token").is_none());

    let browser = gateway.login().await;
    let status = json_body(
        gateway
            .get("/auth/session", Some(&browser.cookie_header()))
            .await,
    )
    .await;
    assert_eq!(status["authenticated"], true);
    assert_eq!(status["csrf_token"], browser.csrf_token.as_str());
    assert!(status.get("expires_at").is_some());
    assert!(status.get("access_token").is_none());
}
