//! Token-attaching reverse proxy for `/api/*`.

use axum::{
    Extension,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{StatusCode, request::Parts},
    response::Response,
};
use bffgate_session::Session;
use chrono::Utc;
use url::Url;

use crate::error::BffError;
use crate::refresh::refresh_session;
use crate::state::AppState;
use crate::upstream;

/// Path prefix stripped before forwarding.
pub const API_PREFIX: &str = "/api";

/// Forward a request with the session's access token.
///
/// A stale token is refreshed before forwarding. A token the upstream rejects
/// with 401 is refreshed and the request retried once, unless a refresh
/// already happened for this request.
pub async fn proxy_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    request: Request<Body>,
) -> Result<Response, BffError> {
    let (parts, body) = request.into_parts();

    let suffix = parts.uri.path().strip_prefix(API_PREFIX).unwrap_or_default();
    let url = upstream::target_url(&state.config.upstream_base, suffix, parts.uri.query())?;

    let body = axum::body::to_bytes(body, state.config.max_body_size)
        .await
        .map_err(|e| {
            tracing::debug!(error = %e, "Failed to buffer request body");
            BffError::PayloadTooLarge
        })?;

    let mut session = session;
    let mut refreshed = false;
    if !session.tokens().is_fresh(Utc::now(), state.config.refresh_skew) {
        session = refresh_session(&state, &session).await?;
        refreshed = true;
    }

    let response = forward(&state, &parts, url.clone(), body.clone(), &session).await?;

    let retry = response.status() == StatusCode::UNAUTHORIZED
        && !refreshed
        && session.tokens().refresh_token.is_some();
    if !retry {
        return Ok(upstream::into_response(response));
    }

    tracing::info!(session = %session.id().short(), "Upstream rejected access token; refreshing");
    let session = refresh_session(&state, &session).await?;
    let response = forward(&state, &parts, url, body, &session).await?;
    Ok(upstream::into_response(response))
}

async fn forward(
    state: &AppState,
    parts: &Parts,
    url: Url,
    body: Bytes,
    session: &Session,
) -> Result<reqwest::Response, BffError> {
    let headers = upstream::outbound_headers(
        &parts.headers,
        &state.config.csrf_header,
        &session.tokens().access_token,
    )?;
    upstream::send(state, parts.method.clone(), url, headers, body).await
}
