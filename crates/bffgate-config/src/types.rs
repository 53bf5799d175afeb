//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [server]     # bind address, shutdown grace, body limit
//! [idp]        # OIDC provider and client registration
//! [session]    # store TTL, sliding window, refresh behavior
//! [store]      # session store backend
//! [csrf]       # CSRF header check
//! [upstream]   # proxied API
//! [cookies]    # cookie names and encryption secret
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, Result};

/// Placeholder written in place of secrets by [`GatewayConfig::redacted`].
pub const REDACTED: &str = "<redacted>";

/// Minimum cookie secret length in bytes.
pub const MIN_COOKIE_SECRET_LEN: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub idp: IdpConfig,
    pub session: SessionConfig,
    pub store: StoreConfig,
    pub csrf: CsrfConfig,
    pub upstream: UpstreamConfig,
    pub cookies: CookieConfig,
}

impl GatewayConfig {
    /// Create a config with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Copy with every secret replaced by [`REDACTED`].
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.idp.client_secret.is_some() {
            copy.idp.client_secret = Some(REDACTED.to_string());
        }
        if copy.cookies.secret.is_some() {
            copy.cookies.secret = Some(REDACTED.to_string());
        }
        copy
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Returns the names of the variables that were applied.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Vec<&'static str>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = Vec::new();
        let mut take = |name: &'static str| {
            let value = lookup(name).filter(|v| !v.is_empty());
            if value.is_some() {
                applied.push(name);
            }
            value
        };

        if let Some(v) = take(ENV_CLIENT_SECRET) {
            self.idp.client_secret = Some(v);
        }
        if let Some(v) = take(ENV_COOKIE_SECRET) {
            self.cookies.secret = Some(v);
        }
        if let Some(v) = take(ENV_STORE_URL) {
            self.store.url = v;
        }
        if let Some(v) = take(ENV_UPSTREAM_URL) {
            self.upstream.base_url = v;
        }
        if let Some(v) = take(ENV_BIND) {
            self.server.bind = v;
        }

        applied
    }

    /// Check the config is usable. Errors here are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        self.server.bind_addr()?;
        if self.server.max_body_size == 0 {
            return Err(ConfigError::invalid("server.max_body_size", "must be > 0"));
        }

        if self.idp.client_id.trim().is_empty() {
            return Err(ConfigError::missing("idp.client_id"));
        }
        parse_url("idp.discovery_url", &self.idp.discovery_url)?;
        parse_url("idp.redirect_uri", &self.idp.redirect_uri)?;
        if let Some(ref uri) = self.idp.post_logout_redirect_uri {
            parse_url("idp.post_logout_redirect_uri", uri)?;
        }
        if self.idp.scopes.is_empty() {
            return Err(ConfigError::missing("idp.scopes"));
        }
        if self.idp.timeout_secs == 0 {
            return Err(ConfigError::invalid("idp.timeout_secs", "must be > 0"));
        }

        if self.session.ttl_secs == 0 {
            return Err(ConfigError::invalid("session.ttl_secs", "must be > 0"));
        }

        if self.store.backend == StoreBackend::Redis {
            let url = parse_url("store.url", &self.store.url)?;
            if !matches!(url.scheme(), "redis" | "rediss" | "redis+unix" | "unix") {
                return Err(ConfigError::invalid(
                    "store.url",
                    format!("unsupported scheme '{}'", url.scheme()),
                ));
            }
        }

        if !is_valid_header_name(&self.csrf.header_name) {
            return Err(ConfigError::invalid(
                "csrf.header_name",
                format!("'{}' is not a valid HTTP header name", self.csrf.header_name),
            ));
        }

        parse_url("upstream.base_url", &self.upstream.base_url)?;
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::invalid("upstream.timeout_secs", "must be > 0"));
        }

        for (field, name) in [
            ("cookies.session_name", &self.cookies.session_name),
            ("cookies.csrf_name", &self.cookies.csrf_name),
            ("cookies.pkce_name", &self.cookies.pkce_name),
        ] {
            if !is_valid_cookie_name(name) {
                return Err(ConfigError::invalid(field, format!("'{}' is not a valid cookie name", name)));
            }
        }
        if let Some(ref secret) = self.cookies.secret
            && secret.len() < MIN_COOKIE_SECRET_LEN
        {
            return Err(ConfigError::invalid(
                "cookies.secret",
                format!("must be at least {} bytes", MIN_COOKIE_SECRET_LEN),
            ));
        }

        Ok(())
    }
}

/// Environment variable overriding `idp.client_secret`.
pub const ENV_CLIENT_SECRET: &str = "BFFGATE_CLIENT_SECRET";
/// Environment variable overriding `cookies.secret`.
pub const ENV_COOKIE_SECRET: &str = "BFFGATE_COOKIE_SECRET";
/// Environment variable overriding `store.url`.
pub const ENV_STORE_URL: &str = "BFFGATE_STORE_URL";
/// Environment variable overriding `upstream.base_url`.
pub const ENV_UPSTREAM_URL: &str = "BFFGATE_UPSTREAM_URL";
/// Environment variable overriding `server.bind`.
pub const ENV_BIND: &str = "BFFGATE_BIND";

fn parse_url(field: &str, value: &str) -> Result<Url> {
    if value.trim().is_empty() {
        return Err(ConfigError::missing(field));
    }
    Url::parse(value).map_err(|e| ConfigError::invalid(field, e.to_string()))
}

// RFC 7230 token characters.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_token_char)
}

fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_token_char)
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub bind: String,
    /// How long in-flight requests may run after a shutdown signal.
    pub shutdown_grace_secs: u64,
    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
    /// Enable request logging.
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            shutdown_grace_secs: 30,
            max_body_size: 10 * 1024 * 1024,
            request_logging: true,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::invalid("server.bind", e.to_string()))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity provider
// ─────────────────────────────────────────────────────────────────────────────

/// OIDC provider and client registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdpConfig {
    /// Issuer URL or the full `.well-known/openid-configuration` URL.
    pub discovery_url: String,
    pub client_id: String,
    /// Confidential client secret. Prefer `BFFGATE_CLIENT_SECRET`.
    pub client_secret: Option<String>,
    /// Callback URL registered with the provider.
    pub redirect_uri: String,
    /// Where the provider sends the browser after end-session.
    pub post_logout_redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    /// Timeout for discovery, code exchange and refresh.
    pub timeout_secs: u64,
}

impl Default for IdpConfig {
    fn default() -> Self {
        Self {
            discovery_url: String::new(),
            client_id: String::new(),
            client_secret: None,
            redirect_uri: "http://127.0.0.1:8080/auth/callback".to_string(),
            post_logout_redirect_uri: None,
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "offline_access".to_string(),
            ],
            timeout_secs: 10,
        }
    }
}

impl IdpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Session lifetime and token refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Store-level session TTL.
    pub ttl_secs: u64,
    /// Extend the TTL on every validated request.
    pub sliding: bool,
    /// Refresh this many seconds before the access token expires.
    pub refresh_skew_secs: u64,
    /// Serialize refreshes per session with a short-lived store lock.
    pub refresh_lock: bool,
    pub refresh_lock_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 8 * 60 * 60,
            sliding: true,
            refresh_skew_secs: 30,
            refresh_lock: true,
            refresh_lock_ttl_secs: 10,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.refresh_skew_secs)
    }

    pub fn refresh_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_lock_ttl_secs.max(1))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Session store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    /// In-process map; single node only.
    Memory,
}

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Redis connection URL.
    pub url: String,
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "bff:".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CSRF
// ─────────────────────────────────────────────────────────────────────────────

/// CSRF header check on state-changing requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub enabled: bool,
    pub header_name: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header_name: "X-CSRF-Token".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Upstream
// ─────────────────────────────────────────────────────────────────────────────

/// Proxied API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Requests to `/api/<rest>` go to `<base_url>/<rest>`.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 30,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cookies
// ─────────────────────────────────────────────────────────────────────────────

/// Cookie names and the key used to encrypt the PKCE cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub session_name: String,
    pub csrf_name: String,
    pub pkce_name: String,
    /// Mark cookies `Secure`. Disable only for local development over http.
    pub secure: bool,
    /// At least 64 bytes. When unset a random key is generated at startup,
    /// so in-flight logins do not survive a restart or span replicas.
    pub secret: Option<String>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            session_name: "bff_session".to_string(),
            csrf_name: "bff_csrf".to_string(),
            pkce_name: "bff_pkce".to_string(),
            secure: true,
            secret: None,
        }
    }
}
