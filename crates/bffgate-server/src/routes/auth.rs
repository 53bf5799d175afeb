//! Login, callback, logout and session-status endpoints.

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::{CookieJar, PrivateCookieJar};
use bffgate_oauth::{OAuthError, PkceChallenge, generate_state};
use bffgate_session::{Session, TokenSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::{constant_time_eq, renewed_cookies, session_id_from};
use crate::cookies::{
    PkceState, clear_cookie, clear_pkce, csrf_cookie, pkce_cookie, read_pkce, sanitize_return_to,
    session_cookie,
};
use crate::error::BffError;
use crate::flow::{FlowEvent, FlowState};
use crate::state::AppState;

/// `302 Found` with a `Location` header.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Login
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Same-origin path to land on after the callback.
    #[serde(default)]
    pub return_to: Option<String>,
}

/// `GET /auth/login`: start the authorization code flow.
pub async fn login_handler(
    State(state): State<AppState>,
    private: PrivateCookieJar,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Result<(PrivateCookieJar, Response), BffError> {
    let config = state.config();
    let from = FlowState::observe(
        read_pkce(&private, &config.cookies.pkce_name).is_some(),
        session_id_from(&jar, &config.cookies.session_name).is_some(),
    );
    let next = from
        .on(FlowEvent::BeginLogin)
        .map_err(|e| BffError::Internal(e.to_string()))?;

    let doc = state.oidc.discover().await.map_err(|e| {
        tracing::warn!(error = %e, "Discovery failed; cannot start login");
        BffError::IdpUnavailable
    })?;

    let pkce = PkceChallenge::generate();
    let login_state = generate_state();
    let location = state
        .oidc
        .authorization_url(&doc, &login_state, &pkce.challenge);

    let return_to = sanitize_return_to(query.return_to.as_deref());
    if query.return_to.is_some() && return_to.is_none() {
        tracing::debug!("Ignoring return_to that is not a same-origin path");
    }

    let cookie = pkce_cookie(
        &config.cookies.pkce_name,
        &PkceState {
            state: login_state,
            code_verifier: pkce.verifier,
            return_to,
        },
        config.cookies.secure,
    );

    tracing::debug!(from = %from, to = %next, "Redirecting to identity provider");
    Ok((private.add(cookie), found(location.as_str())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Callback
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Body of a successful callback without `return_to`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub csrf_token: String,
}

/// `GET /auth/callback`: complete the flow and issue a session.
///
/// The login cookie is single-use: it is cleared on success and on every
/// failure.
pub async fn callback_handler(
    State(state): State<AppState>,
    private: PrivateCookieJar,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let pkce_name = state.config().cookies.pkce_name.clone();
    let pkce = read_pkce(&private, &pkce_name);
    let private = private.remove(clear_pkce(&pkce_name));

    match complete_login(&state, pkce, jar, query).await {
        Ok((jar, response)) => (private, jar, response).into_response(),
        Err(e) => (private, e).into_response(),
    }
}

async fn complete_login(
    state: &AppState,
    pkce: Option<PkceState>,
    jar: CookieJar,
    query: CallbackQuery,
) -> Result<(CookieJar, Response), BffError> {
    let config = state.config();
    let previous = session_id_from(&jar, &config.cookies.session_name);

    FlowState::observe(pkce.is_some(), previous.is_some())
        .on(FlowEvent::CompleteCallback)
        .map_err(|e| {
            tracing::debug!(error = %e, "Callback without a pending login");
            BffError::AuthStateMissing
        })?;
    let pkce = pkce.ok_or(BffError::AuthStateMissing)?;

    if let Some(error) = query.error {
        tracing::warn!(
            error = %error,
            description = ?query.error_description,
            "Identity provider returned an error"
        );
        return Err(BffError::AuthIdpError(error));
    }

    let returned_state = query.state.as_deref().unwrap_or_default();
    if !constant_time_eq(returned_state, &pkce.state) {
        return Err(BffError::AuthStateMismatch);
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or(BffError::AuthCodeMissing)?;

    let response = match state.oidc.exchange_code(&code, &pkce.code_verifier).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Authorization code exchange failed");
            // An unreachable token endpoint may have moved; rediscover on the next login.
            if matches!(e, OAuthError::Network(_)) {
                state.oidc.invalidate_discovery().await;
            }
            return Err(BffError::AuthTokenExchangeFailed);
        }
    };

    let expires_at = response.expires_at(Utc::now());
    let tokens = TokenSet::new(
        response.access_token,
        response.refresh_token,
        response.id_token,
        expires_at,
    );

    // A fresh login replaces any session the browser already had.
    if let Some(previous) = previous
        && let Err(e) = state.store.delete(&previous).await
    {
        tracing::warn!(session = %previous.short(), error = %e, "Failed to delete previous session");
    }

    let session = Session::issue(tokens);
    state.store.create(&session).await?;
    tracing::info!(session = %session.id().short(), "Session created");

    let jar = jar
        .add(session_cookie(
            &config.cookies.session_name,
            session.id().as_str(),
            config.session_ttl,
            config.cookies.secure,
        ))
        .add(csrf_cookie(
            &config.cookies.csrf_name,
            session.csrf_token(),
            config.session_ttl,
            config.cookies.secure,
        ));

    let response = match pkce.return_to {
        Some(path) => found(&path),
        None => Json(CallbackResponse {
            csrf_token: session.csrf_token().to_string(),
        })
        .into_response(),
    };

    Ok((jar, response))
}

// ─────────────────────────────────────────────────────────────────────────────
// Logout
// ─────────────────────────────────────────────────────────────────────────────

/// Body of a logout without a provider redirect.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub status: String,
}

/// `POST /auth/logout`: delete the session and clear cookies. Idempotent.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Response), BffError> {
    let config = state.config();
    let id = session_id_from(&jar, &config.cookies.session_name);

    let from = FlowState::observe(false, id.is_some());
    let next = from
        .on(FlowEvent::Logout)
        .map_err(|e| BffError::Internal(e.to_string()))?;

    let mut id_token = None;
    if let Some(id) = &id {
        if let Some(session) = state.store.peek(id).await? {
            id_token = session.tokens().id_token.clone();
        }
        state.store.delete(id).await?;
        tracing::info!(session = %id.short(), "Session deleted");
    }

    let jar = jar
        .remove(clear_cookie(&config.cookies.session_name))
        .remove(clear_cookie(&config.cookies.csrf_name));

    let redirect = match id_token {
        Some(hint) => end_session_redirect(&state, &hint).await,
        None => None,
    };

    tracing::debug!(from = %from, to = %next, provider_logout = redirect.is_some(), "Logged out");

    let response = match redirect {
        Some(url) => found(url.as_str()),
        None => Json(LogoutResponse {
            status: "logged_out".to_string(),
        })
        .into_response(),
    };
    Ok((jar, response))
}

async fn end_session_redirect(state: &AppState, id_token_hint: &str) -> Option<Url> {
    let doc = match state.oidc.discover().await {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(error = %e, "Discovery failed; skipping provider logout");
            return None;
        }
    };

    state.oidc.end_session_url(
        &doc,
        id_token_hint,
        state.config().post_logout_redirect_uri.as_ref(),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Session status
// ─────────────────────────────────────────────────────────────────────────────

/// Session status for the browser. Never carries tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    /// Access-token expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
}

/// `GET /auth/session`: whether the browser has a live session.
pub async fn session_status_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(Option<CookieJar>, Json<SessionStatus>), BffError> {
    let anonymous = SessionStatus {
        authenticated: false,
        expires_at: None,
        csrf_token: None,
    };

    let Some(id) = session_id_from(&jar, &state.config().cookies.session_name) else {
        return Ok((None, Json(anonymous)));
    };

    let Some(session) = state.store.get(&id).await? else {
        return Ok((None, Json(anonymous)));
    };

    let status = SessionStatus {
        authenticated: true,
        expires_at: Some(session.tokens().expires_at),
        csrf_token: Some(session.csrf_token().to_string()),
    };
    Ok((renewed_cookies(&state, &session), Json(status)))
}
