//! Error types for the OIDC client.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Errors that can occur while talking to the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// Network/HTTP error (connection refused, DNS, TLS, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// The identity provider did not answer within the configured timeout.
    #[error("Identity provider request timed out")]
    Timeout,

    /// The discovery document could not be fetched or parsed.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// The token endpoint rejected the request or returned a malformed body.
    #[error("Token endpoint error ({operation}): {detail}")]
    TokenExchange {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl OAuthError {
    /// Whether this error came from a timeout rather than a rejection.
    pub fn is_timeout(&self) -> bool {
        matches!(self, OAuthError::Timeout)
    }
}

impl From<reqwest::Error> for OAuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OAuthError::Timeout
        } else {
            OAuthError::Network(e.to_string())
        }
    }
}
