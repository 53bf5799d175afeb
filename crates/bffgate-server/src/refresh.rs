//! Access-token refresh for proxied requests.
//!
//! A refresh replaces the session's whole token set in the store. When the
//! refresh lock is enabled, concurrent requests for the same session wait for
//! the lock holder's result instead of calling the provider again.

use std::time::Duration;

use bffgate_session::{LockToken, Session, TokenSet};
use chrono::Utc;
use tokio::time::Instant;

use crate::error::BffError;
use crate::state::AppState;

/// How often a waiting request re-reads the session while another request
/// holds the refresh lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn lock_name(session: &Session) -> String {
    format!("refresh:{}", session.id().as_str())
}

/// Whether `current` holds tokens another request stored after `seen`.
fn refreshed_elsewhere(seen: &TokenSet, current: &TokenSet, skew: Duration) -> bool {
    current != seen && current.is_fresh(Utc::now(), skew)
}

/// Refresh the session's access token and persist the new token set.
///
/// Fails with [`BffError::ProxyTokenExpired`] when the session has no refresh
/// token or the provider rejects it. The session itself is left in place.
pub async fn refresh_session(state: &AppState, session: &Session) -> Result<Session, BffError> {
    if session.tokens().refresh_token.is_none() {
        tracing::debug!(session = %session.id().short(), "No refresh token; cannot refresh");
        return Err(BffError::ProxyTokenExpired);
    }

    let Some(lock_ttl) = state.config.refresh_lock_ttl else {
        return refresh_now(state, session).await;
    };

    let name = lock_name(session);
    match state.store.try_lock(&name, lock_ttl).await {
        Ok(Some(token)) => refresh_locked(state, session, &name, token).await,
        Ok(None) => wait_for_peer(state, session, &name, lock_ttl).await,
        Err(e) => {
            tracing::warn!(session = %session.id().short(), error = %e, "Refresh lock unavailable; refreshing without it");
            refresh_now(state, session).await
        }
    }
}

async fn refresh_locked(
    state: &AppState,
    session: &Session,
    name: &str,
    token: LockToken,
) -> Result<Session, BffError> {
    let result = refresh_holding_lock(state, session).await;
    if let Err(e) = state.store.unlock(name, &token).await {
        tracing::warn!(session = %session.id().short(), error = %e, "Failed to release refresh lock");
    }
    result
}

async fn refresh_holding_lock(state: &AppState, session: &Session) -> Result<Session, BffError> {
    // Another request may have finished a refresh just before we took the lock.
    let current = state
        .store
        .peek(session.id())
        .await?
        .ok_or(BffError::SessionMissing)?;

    if refreshed_elsewhere(session.tokens(), current.tokens(), state.config.refresh_skew) {
        return Ok(current);
    }
    refresh_now(state, &current).await
}

/// Wait for the lock holder's tokens. If the holder releases the lock
/// without storing fresh tokens, take the lock and refresh here.
async fn wait_for_peer(
    state: &AppState,
    session: &Session,
    name: &str,
    lock_ttl: Duration,
) -> Result<Session, BffError> {
    let deadline = Instant::now() + lock_ttl;

    while Instant::now() < deadline {
        tokio::time::sleep(LOCK_POLL_INTERVAL).await;

        let current = state
            .store
            .peek(session.id())
            .await?
            .ok_or(BffError::SessionMissing)?;
        if refreshed_elsewhere(session.tokens(), current.tokens(), state.config.refresh_skew) {
            tracing::debug!(session = %session.id().short(), "Using tokens refreshed by a concurrent request");
            return Ok(current);
        }

        if let Ok(Some(token)) = state.store.try_lock(name, lock_ttl).await {
            tracing::debug!(session = %session.id().short(), "Refresh lock released without new tokens; refreshing");
            return refresh_locked(state, session, name, token).await;
        }
    }

    tracing::warn!(session = %session.id().short(), "Refresh lock wait elapsed; refreshing anyway");
    refresh_now(state, session).await
}

async fn refresh_now(state: &AppState, session: &Session) -> Result<Session, BffError> {
    let Some(refresh_token) = session.tokens().refresh_token.as_deref() else {
        return Err(BffError::ProxyTokenExpired);
    };

    let response = state.oidc.refresh_token(refresh_token).await.map_err(|e| {
        tracing::warn!(session = %session.id().short(), error = %e, "Token refresh failed");
        BffError::ProxyTokenExpired
    })?;

    let expires_at = response.expires_at(Utc::now());
    let tokens = session.tokens().refreshed(
        response.access_token,
        response.refresh_token,
        response.id_token,
        expires_at,
    );

    state.store.update(session.id(), &tokens).await?;
    tracing::info!(session = %session.id().short(), expires_at = %expires_at, "Access token refreshed");

    Ok(session.clone().with_tokens(tokens))
}
