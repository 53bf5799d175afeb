//! Session and CSRF middleware.
//!
//! Resolves the session cookie, loads the session from the store and, for
//! state-changing methods, checks the CSRF header against the session's
//! token. The loaded [`Session`] is inserted into request extensions:
//!
//! ```ignore
//! async fn handler(Extension(session): Extension<Session>) -> impl IntoResponse { ... }
//! ```
//!
//! # Security
//!
//! CSRF comparison uses constant-time comparison to prevent timing attacks.
//! A request that fails the CSRF check does not extend the session TTL.
//!
//! With sliding sessions the session and CSRF cookies are re-issued with a
//! fresh `Max-Age` on every validated request, so the browser keeps the
//! cookie as long as the store keeps the record.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use bffgate_session::{Session, SessionId};
use subtle::ConstantTimeEq;

use crate::cookies::{csrf_cookie, session_cookie};
use crate::error::BffError;
use crate::state::AppState;

/// Methods that never change state and skip the CSRF check.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Constant-time string comparison.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() == b_bytes.len() {
        a_bytes.ct_eq(b_bytes).into()
    } else {
        // Keep timing independent of where the lengths diverge.
        let _ = a_bytes.ct_eq(a_bytes);
        false
    }
}

/// Check the CSRF header against the session's token.
pub fn verify_csrf(headers: &HeaderMap, header: &HeaderName, expected: &str) -> Result<(), BffError> {
    let provided = headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .ok_or(BffError::CsrfInvalid)?;

    if constant_time_eq(provided, expected) {
        Ok(())
    } else {
        Err(BffError::CsrfInvalid)
    }
}

/// Session id from the request cookies.
pub fn session_id_from(jar: &CookieJar, cookie_name: &str) -> Option<SessionId> {
    jar.get(cookie_name)
        .map(|c| c.value())
        .filter(|v| !v.is_empty())
        .map(SessionId::new)
}

/// Session/CSRF middleware function.
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, BffError> {
    let session = load_session(&state, &jar, request.method(), request.headers()).await?;

    tracing::debug!(
        session = %session.id().short(),
        method = %request.method(),
        "Session resolved"
    );

    let renewed = renewed_cookies(&state, &session);
    request.extensions_mut().insert(session);
    let response = next.run(request).await;

    Ok(match renewed {
        Some(jar) => (jar, response).into_response(),
        None => response,
    })
}

/// Session and CSRF cookies with a fresh `Max-Age`, when the store slides.
pub(crate) fn renewed_cookies(state: &AppState, session: &Session) -> Option<CookieJar> {
    if !state.store.config().sliding {
        return None;
    }

    let config = state.config();
    let jar = CookieJar::new()
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
    Some(jar)
}

async fn load_session(
    state: &AppState,
    jar: &CookieJar,
    method: &Method,
    headers: &HeaderMap,
) -> Result<Session, BffError> {
    let config = state.config();
    let id = session_id_from(jar, &config.cookies.session_name).ok_or(BffError::SessionMissing)?;

    let needs_csrf = config.csrf_enabled && !is_safe_method(method);
    if !needs_csrf {
        // Sliding stores extend the TTL on this read.
        return state.store.get(&id).await?.ok_or(BffError::SessionMissing);
    }

    // Read without sliding, check CSRF, then extend.
    let session = state.store.peek(&id).await?.ok_or(BffError::SessionMissing)?;
    verify_csrf(headers, &config.csrf_header, session.csrf_token())?;

    if !state.store.touch(&id).await? {
        return Err(BffError::SessionMissing);
    }
    Ok(session)
}
