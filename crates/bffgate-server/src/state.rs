//! Application state shared across handlers.

use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use bffgate_oauth::OidcClient;
use bffgate_session::SharedSessionStore;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

/// Application state shared across all handlers.
///
/// Holds no session data: every request reads the store.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// OIDC relying-party client.
    pub oidc: Arc<OidcClient>,

    /// Session store.
    pub store: SharedSessionStore,

    /// HTTP client for upstream forwarding.
    pub upstream: reqwest::Client,

    /// Key encrypting the login (PKCE) cookie.
    cookie_key: Key,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: ServerConfig,
        oidc: OidcClient,
        store: SharedSessionStore,
        cookie_key: Key,
    ) -> Result<Self> {
        let upstream = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            // Redirects are the browser's business.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ServerError::Config(format!("Failed to build upstream client: {}", e)))?;

        Ok(Self {
            config: Arc::new(config),
            oidc: Arc::new(oidc),
            store,
            upstream,
            cookie_key,
        })
    }

    /// Get the server config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
