//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderName;
use bffgate_config::GatewayConfig;
use url::Url;

use crate::error::{Result, ServerError};

/// Default max body size for proxied requests (10 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Default shutdown grace period.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Default CSRF header.
pub const DEFAULT_CSRF_HEADER: &str = "x-csrf-token";

/// Cookie names and attributes.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub session_name: String,
    pub csrf_name: String,
    pub pkce_name: String,
    /// Mark cookies `Secure`.
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            session_name: "bff_session".to_string(),
            csrf_name: "bff_csrf".to_string(),
            pkce_name: "bff_pkce".to_string(),
            secure: true,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Enable request logging.
    pub request_logging: bool,

    /// Maximum proxied request body size in bytes.
    pub max_body_size: usize,

    /// How long in-flight requests may run after shutdown starts.
    pub shutdown_grace: Duration,

    /// Require the CSRF header on state-changing requests.
    pub csrf_enabled: bool,

    pub csrf_header: HeaderName,

    pub cookies: CookieSettings,

    /// Session cookie Max-Age; matches the store TTL.
    pub session_ttl: Duration,

    /// Tokens expiring within this window are refreshed before forwarding.
    pub refresh_skew: Duration,

    /// Per-session refresh lock TTL. `None` disables the lock.
    pub refresh_lock_ttl: Option<Duration>,

    /// Base URL `/api/*` is forwarded to.
    pub upstream_base: Url,

    pub upstream_timeout: Duration,

    /// Sent to the provider's end-session endpoint.
    pub post_logout_redirect_uri: Option<Url>,
}

impl ServerConfig {
    /// Create a config forwarding to `upstream_base` with default settings.
    pub fn new(upstream_base: Url) -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            request_logging: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            csrf_enabled: true,
            csrf_header: HeaderName::from_static(DEFAULT_CSRF_HEADER),
            cookies: CookieSettings::default(),
            session_ttl: bffgate_session::DEFAULT_TTL,
            refresh_skew: Duration::from_secs(30),
            refresh_lock_ttl: Some(Duration::from_secs(10)),
            upstream_base,
            upstream_timeout: Duration::from_secs(30),
            post_logout_redirect_uri: None,
        }
    }

    /// Build from a validated [`GatewayConfig`].
    pub fn from_gateway(config: &GatewayConfig) -> Result<Self> {
        let upstream_base = parse_url("upstream.base_url", &config.upstream.base_url)?;
        let post_logout_redirect_uri = config
            .idp
            .post_logout_redirect_uri
            .as_deref()
            .map(|uri| parse_url("idp.post_logout_redirect_uri", uri))
            .transpose()?;
        let csrf_header = HeaderName::try_from(config.csrf.header_name.as_str())
            .map_err(|e| ServerError::Config(format!("csrf.header_name: {}", e)))?;
        let bind_address = config
            .server
            .bind_addr()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        Ok(Self {
            bind_address,
            request_logging: config.server.request_logging,
            max_body_size: config.server.max_body_size,
            shutdown_grace: config.server.shutdown_grace(),
            csrf_enabled: config.csrf.enabled,
            csrf_header,
            cookies: CookieSettings {
                session_name: config.cookies.session_name.clone(),
                csrf_name: config.cookies.csrf_name.clone(),
                pkce_name: config.cookies.pkce_name.clone(),
                secure: config.cookies.secure,
            },
            session_ttl: config.session.ttl(),
            refresh_skew: config.session.refresh_skew(),
            refresh_lock_ttl: config
                .session
                .refresh_lock
                .then(|| config.session.refresh_lock_ttl()),
            upstream_base,
            upstream_timeout: config.upstream.timeout(),
            post_logout_redirect_uri,
        })
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Enable or disable request logging.
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    /// Enable or disable the CSRF check.
    pub fn with_csrf(mut self, enabled: bool) -> Self {
        self.csrf_enabled = enabled;
        self
    }

    /// Set the refresh lock TTL, or disable the lock with `None`.
    pub fn with_refresh_lock(mut self, ttl: Option<Duration>) -> Self {
        self.refresh_lock_ttl = ttl;
        self
    }

    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.cookies.secure = secure;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_post_logout_redirect_uri(mut self, uri: Url) -> Self {
        self.post_logout_redirect_uri = Some(uri);
        self
    }

    /// Set the maximum proxied request body size.
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set the session cookie lifetime. Should match the store TTL.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| ServerError::Config(format!("{}: {}", field, e)))
}
