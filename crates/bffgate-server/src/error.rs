//! Error types for the server.
//!
//! [`BffError`] is what handlers and middleware return: each variant maps to
//! one HTTP status and one stable machine-readable code, rendered as
//! `{"error": <code>, "message": <generic text>}`. Provider and upstream
//! details are logged, never returned.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bffgate_session::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Request-level error.
#[derive(Debug, Error)]
pub enum BffError {
    #[error("login state cookie missing or expired")]
    AuthStateMissing,

    #[error("login state mismatch")]
    AuthStateMismatch,

    #[error("authorization code missing")]
    AuthCodeMissing,

    /// The provider redirected back with an `error` parameter.
    #[error("identity provider returned error '{0}'")]
    AuthIdpError(String),

    #[error("authorization code exchange failed")]
    AuthTokenExchangeFailed,

    /// Discovery failed; login cannot start.
    #[error("identity provider unavailable")]
    IdpUnavailable,

    #[error("no valid session")]
    SessionMissing,

    #[error("access token expired and could not be refreshed")]
    ProxyTokenExpired,

    #[error("CSRF token missing or invalid")]
    CsrfInvalid,

    #[error("upstream unavailable (timeout: {timeout})")]
    UpstreamUnavailable { timeout: bool },

    #[error("session store unavailable")]
    StoreUnavailable,

    #[error("request path cannot be forwarded")]
    InvalidPath,

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("internal error: {0}")]
    Internal(String),
}

impl BffError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            BffError::AuthStateMissing => "BFF_AUTH_STATE_MISSING",
            BffError::AuthStateMismatch => "BFF_AUTH_STATE_MISMATCH",
            BffError::AuthCodeMissing => "BFF_AUTH_CODE_MISSING",
            BffError::AuthIdpError(_) => "BFF_AUTH_IDP_ERROR",
            BffError::AuthTokenExchangeFailed => "BFF_AUTH_TOKEN_EXCHANGE_FAILED",
            BffError::IdpUnavailable => "BFF_IDP_UNAVAILABLE",
            BffError::SessionMissing => "BFF_SESSION_MISSING",
            BffError::ProxyTokenExpired => "BFF_PROXY_TOKEN_EXPIRED",
            BffError::CsrfInvalid => "BFF_CSRF_INVALID",
            BffError::UpstreamUnavailable { .. } => "BFF_UPSTREAM_UNAVAILABLE",
            BffError::StoreUnavailable => "BFF_STORE_UNAVAILABLE",
            BffError::InvalidPath => "BFF_INVALID_PATH",
            BffError::PayloadTooLarge => "BFF_PAYLOAD_TOO_LARGE",
            BffError::Internal(_) => "BFF_INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BffError::AuthStateMissing
            | BffError::AuthStateMismatch
            | BffError::AuthCodeMissing
            | BffError::AuthIdpError(_)
            | BffError::InvalidPath => StatusCode::BAD_REQUEST,
            BffError::AuthTokenExchangeFailed | BffError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BffError::IdpUnavailable => StatusCode::BAD_GATEWAY,
            BffError::SessionMissing | BffError::ProxyTokenExpired => StatusCode::UNAUTHORIZED,
            BffError::CsrfInvalid => StatusCode::FORBIDDEN,
            BffError::UpstreamUnavailable { timeout: true } => StatusCode::GATEWAY_TIMEOUT,
            BffError::UpstreamUnavailable { timeout: false } => StatusCode::BAD_GATEWAY,
            BffError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            BffError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Generic client-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            BffError::AuthStateMissing => "Login state is missing or expired; start the login again",
            BffError::AuthStateMismatch => "Login state does not match; start the login again",
            BffError::AuthCodeMissing => "Authorization code missing from callback",
            BffError::AuthIdpError(_) => "The identity provider rejected the login",
            BffError::AuthTokenExchangeFailed => "Could not complete login with the identity provider",
            BffError::IdpUnavailable => "Identity provider is unavailable",
            BffError::SessionMissing => "Authentication required",
            BffError::ProxyTokenExpired => "Session expired; log in again",
            BffError::CsrfInvalid => "CSRF token missing or invalid",
            BffError::UpstreamUnavailable { .. } => "Upstream service is unavailable",
            BffError::StoreUnavailable => "Session store is unavailable",
            BffError::InvalidPath => "Request path cannot be forwarded",
            BffError::PayloadTooLarge => "Request body too large",
            BffError::Internal(_) => "Internal error",
        }
    }
}

impl From<StoreError> for BffError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => BffError::SessionMissing,
            StoreError::AlreadyExists(id) => {
                BffError::Internal(format!("session id collision ({})", id))
            }
            StoreError::Backend(msg) => {
                tracing::error!(error = %msg, "Session store backend error");
                BffError::StoreUnavailable
            }
            StoreError::Serialization(e) => {
                tracing::error!(error = %e, "Session record could not be decoded");
                BffError::StoreUnavailable
            }
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error: &'static str,
    /// Human-readable error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl IntoResponse for BffError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status.is_server_error() {
            tracing::error!(status = %status.as_u16(), code, error = %self, "Request failed");
        } else {
            tracing::warn!(status = %status.as_u16(), code, error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: code,
            message: Some(self.message()),
        };

        (status, Json(body)).into_response()
    }
}

/// Startup and lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
