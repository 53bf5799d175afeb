//! OIDC client: provider discovery, authorization URLs, code exchange,
//! token refresh and end-session URLs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

use crate::error::{OAuthError, Result};

/// Path suffix of the OIDC discovery document.
const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 300;

/// Default timeout for every identity provider call.
pub const DEFAULT_IDP_TIMEOUT: Duration = Duration::from_secs(10);

/// Static configuration of the OIDC client.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Issuer URL or the full `.well-known/openid-configuration` URL.
    pub discovery_url: Url,
    pub client_id: String,
    /// Sent as `client_secret` (client_secret_post) when set.
    pub client_secret: Option<String>,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
    /// Timeout applied to discovery, code exchange and refresh independently.
    pub timeout: Duration,
}

impl OidcConfig {
    /// Create a config with the default `openid` scope and timeout.
    pub fn new(discovery_url: Url, client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            discovery_url,
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri,
            scopes: vec!["openid".to_string()],
            timeout: DEFAULT_IDP_TIMEOUT,
        }
    }

    /// Set the client secret.
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Override the requested scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Override the identity provider timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The URL the discovery document is fetched from.
    ///
    /// Accepts either the issuer or the well-known URL itself.
    pub fn discovery_endpoint(&self) -> String {
        let raw = self.discovery_url.as_str();
        if raw.ends_with(WELL_KNOWN_PATH) {
            raw.to_string()
        } else {
            format!("{}{}", raw.trim_end_matches('/'), WELL_KNOWN_PATH)
        }
    }
}

/// The subset of the OIDC discovery document the gateway relies on.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
}

/// Token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute access-token expiry computed from `expires_in`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        now + chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
    }
}

// Tokens never reach the logs.
impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .field("scope", &self.scope)
            .finish()
    }
}

/// OIDC relying-party client.
///
/// Cheap to share behind an `Arc`; the discovery document is fetched lazily
/// on first use and cached until [`OidcClient::invalidate_discovery`].
#[derive(Debug)]
pub struct OidcClient {
    config: OidcConfig,
    http: reqwest::Client,
    discovery: RwLock<Option<Arc<DiscoveryDocument>>>,
}

impl OidcClient {
    /// Create a new client with its own connection pool.
    pub fn new(config: OidcConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OAuthError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_http_client(config, http))
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    pub fn with_http_client(config: OidcConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            discovery: RwLock::new(None),
        }
    }

    /// Get the config.
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// Fetch the discovery document, or return the cached copy.
    ///
    /// Failures are never cached: the next caller retries the fetch.
    pub async fn discover(&self) -> Result<Arc<DiscoveryDocument>> {
        if let Some(doc) = self.discovery.read().await.as_ref() {
            return Ok(doc.clone());
        }

        let mut slot = self.discovery.write().await;
        if let Some(doc) = slot.as_ref() {
            return Ok(doc.clone());
        }

        let endpoint = self.config.discovery_endpoint();
        tracing::debug!(endpoint = %endpoint, "Fetching OIDC discovery document");

        let response = self
            .http
            .get(&endpoint)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OAuthError::Timeout
                } else {
                    OAuthError::Discovery(format!("request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(OAuthError::Discovery(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let doc: DiscoveryDocument = response
            .json()
            .await
            .map_err(|e| OAuthError::Discovery(format!("malformed document: {}", e)))?;

        tracing::info!(
            issuer = %doc.issuer,
            end_session = doc.end_session_endpoint.is_some(),
            "OIDC discovery document cached"
        );

        let doc = Arc::new(doc);
        *slot = Some(doc.clone());
        Ok(doc)
    }

    /// Drop the cached discovery document so the next call refetches it.
    pub async fn invalidate_discovery(&self) {
        self.discovery.write().await.take();
    }

    /// Build the authorization URL for the code + PKCE flow.
    pub fn authorization_url(&self, doc: &DiscoveryDocument, state: &str, challenge: &str) -> Url {
        let scope = self.config.scopes.join(" ");

        let mut url = doc.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", state)
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256");
        url
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", verifier),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        self.token_request("token exchange", &params).await
    }

    /// Refresh an access token.
    ///
    /// The response may omit `refresh_token`; callers keep the previous one.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        self.token_request("token refresh", &params).await
    }

    /// Build the RP-initiated logout URL, if the provider supports it.
    pub fn end_session_url(
        &self,
        doc: &DiscoveryDocument,
        id_token_hint: &str,
        post_logout_uri: Option<&Url>,
    ) -> Option<Url> {
        let mut url = doc.end_session_endpoint.clone()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("id_token_hint", id_token_hint);
            query.append_pair("client_id", &self.config.client_id);
            if let Some(uri) = post_logout_uri {
                query.append_pair("post_logout_redirect_uri", uri.as_str());
            }
        }
        Some(url)
    }

    async fn token_request(
        &self,
        operation: &'static str,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse> {
        let doc = self.discover().await?;

        let response = self
            .http
            .post(doc.token_endpoint.clone())
            .timeout(self.config.timeout)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(operation, status = %status, body = %body, "Token endpoint rejected request");
            return Err(OAuthError::TokenExchange {
                operation,
                status: Some(status.as_u16()),
                detail: format!("unexpected status {}", status),
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| OAuthError::TokenExchange {
                operation,
                status: Some(status.as_u16()),
                detail: format!("malformed response: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn discovery_json(base: &str, with_end_session: bool) -> serde_json::Value {
        let mut doc = serde_json::json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/authorize"),
            "token_endpoint": format!("{base}/token"),
        });
        if with_end_session {
            doc["end_session_endpoint"] = serde_json::json!(format!("{base}/logout"));
        }
        doc
    }

    fn client_for(server: &MockServer) -> OidcClient {
        let config = OidcConfig::new(
            server.uri().parse().unwrap(),
            "test-client",
            "https://app.example.com/auth/callback".parse().unwrap(),
        )
        .with_scopes(vec!["openid".into(), "profile".into()]);
        OidcClient::new(config).unwrap()
    }

    async fn mount_discovery(server: &MockServer, with_end_session: bool) {
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(discovery_json(&server.uri(), with_end_session)),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_discovery_endpoint_from_issuer() {
        let config = OidcConfig::new(
            "https://idp.example.com/realms/main/".parse().unwrap(),
            "c",
            "https://app/cb".parse().unwrap(),
        );
        assert_eq!(
            config.discovery_endpoint(),
            "https://idp.example.com/realms/main/.well-known/openid-configuration"
        );

        let config = OidcConfig::new(
            "https://idp.example.com/.well-known/openid-configuration"
                .parse()
                .unwrap(),
            "c",
            "https://app/cb".parse().unwrap(),
        );
        assert_eq!(
            config.discovery_endpoint(),
            "https://idp.example.com/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn test_discover_caches_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery_json(&server.uri(), false)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = client.discover().await.unwrap();
        let second = client.discover().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.end_session_endpoint.is_none());
    }

    #[tokio::test]
    async fn test_discover_failure_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_discovery(&server, false).await;

        let client = client_for(&server);
        let err = client.discover().await.unwrap_err();
        assert!(matches!(err, OAuthError::Discovery(_)));

        assert!(client.discover().await.is_ok());
    }

    #[tokio::test]
    async fn test_discover_malformed_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"issuer\": 1}"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.discover().await,
            Err(OAuthError::Discovery(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_discovery_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery_json(&server.uri(), false)))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.discover().await.unwrap();
        client.invalidate_discovery().await;
        client.discover().await.unwrap();
    }

    #[tokio::test]
    async fn test_authorization_url() {
        let server = MockServer::start().await;
        mount_discovery(&server, false).await;
        let client = client_for(&server);
        let doc = client.discover().await.unwrap();

        let url = client.authorization_url(&doc, "test_state", "test_challenge");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/authorize");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "test-client");
        assert_eq!(pairs["redirect_uri"], "https://app.example.com/auth/callback");
        assert_eq!(pairs["scope"], "openid profile");
        assert_eq!(pairs["state"], "test_state");
        assert_eq!(pairs["code_challenge"], "test_challenge");
        assert_eq!(pairs["code_challenge_method"], "S256");
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let server = MockServer::start().await;
        mount_discovery(&server, false).await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc123"))
            .and(body_string_contains("code_verifier=verifier-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1",
                "token_type": "Bearer",
                "expires_in": 600,
                "refresh_token": "rt-1",
                "id_token": "idt-1",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tokens = client.exchange_code("abc123", "verifier-1").await.unwrap();
        assert_eq!(tokens.access_token, "at-1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(tokens.id_token.as_deref(), Some("idt-1"));

        let now = Utc::now();
        assert_eq!(tokens.expires_at(now), now + chrono::Duration::seconds(600));
    }

    #[tokio::test]
    async fn test_exchange_code_sends_client_secret() {
        let server = MockServer::start().await;
        mount_discovery(&server, false).await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "at"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = OidcConfig::new(
            server.uri().parse().unwrap(),
            "test-client",
            "https://app.example.com/auth/callback".parse().unwrap(),
        )
        .with_client_secret("s3cret");
        let client = OidcClient::new(config).unwrap();
        let tokens = client.exchange_code("code", "verifier").await.unwrap();
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let server = MockServer::start().await;
        mount_discovery(&server, false).await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.exchange_code("bad", "verifier").await.unwrap_err();
        match err {
            OAuthError::TokenExchange { status, .. } => assert_eq!(status, Some(400)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_code_malformed_json() {
        let server = MockServer::start().await;
        mount_discovery(&server, false).await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.exchange_code("code", "verifier").await,
            Err(OAuthError::TokenExchange { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_token() {
        let server = MockServer::start().await;
        mount_discovery(&server, false).await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-new",
                "expires_in": 60,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tokens = client.refresh_token("rt-old").await.unwrap();
        assert_eq!(tokens.access_token, "at-new");
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_token_request_timeout() {
        let server = MockServer::start().await;
        mount_discovery(&server, false).await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "late"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = OidcConfig::new(
            server.uri().parse().unwrap(),
            "test-client",
            "https://app.example.com/auth/callback".parse().unwrap(),
        )
        .with_timeout(Duration::from_millis(100));
        let client = OidcClient::new(config).unwrap();

        let err = client.refresh_token("rt").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_end_session_url() {
        let server = MockServer::start().await;
        mount_discovery(&server, true).await;
        let client = client_for(&server);
        let doc = client.discover().await.unwrap();

        let post_logout: Url = "https://app.example.com/".parse().unwrap();
        let url = client
            .end_session_url(&doc, "idt-1", Some(&post_logout))
            .unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(url.path(), "/logout");
        assert_eq!(pairs["id_token_hint"], "idt-1");
        assert_eq!(pairs["post_logout_redirect_uri"], "https://app.example.com/");
    }

    #[tokio::test]
    async fn test_end_session_url_absent() {
        let server = MockServer::start().await;
        mount_discovery(&server, false).await;
        let client = client_for(&server);
        let doc = client.discover().await.unwrap();

        assert!(client.end_session_url(&doc, "idt-1", None).is_none());
    }

    #[test]
    fn test_token_response_debug_redacts_tokens() {
        let tokens: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "super-secret-access",
            "refresh_token": "super-secret-refresh",
        }))
        .unwrap();
        let rendered = format!("{tokens:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("has_refresh_token: true"));
    }

    #[test]
    fn test_missing_expires_in_uses_default() {
        let tokens: TokenResponse =
            serde_json::from_value(serde_json::json!({"access_token": "at"})).unwrap();
        let now = Utc::now();
        assert_eq!(
            tokens.expires_at(now),
            now + chrono::Duration::seconds(DEFAULT_EXPIRES_IN_SECS as i64)
        );
    }
}
