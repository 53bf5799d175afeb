//! Cookie construction and parsing.
//!
//! Three cookies:
//! - session: opaque session id, HttpOnly
//! - CSRF companion: the session's CSRF token, readable by page scripts
//! - login: encrypted `{state, code_verifier, return_to}`, scoped to `/auth`,
//!   lives only between login and callback

use std::time::Duration as StdDuration;

use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;

/// Path the login cookie is scoped to.
pub const AUTH_PATH: &str = "/auth";

/// Lifetime of the login cookie.
pub const PKCE_COOKIE_TTL: Duration = Duration::minutes(5);

/// State carried from login to callback.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceState {
    pub state: String,
    pub code_verifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
}

impl std::fmt::Debug for PkceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceState")
            .field("return_to", &self.return_to)
            .finish_non_exhaustive()
    }
}

fn max_age(ttl: StdDuration) -> Duration {
    Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

/// Create the encrypted login cookie.
pub fn pkce_cookie(name: &str, pkce: &PkceState, secure: bool) -> Cookie<'static> {
    // Serializing plain strings cannot fail.
    let value = serde_json::to_string(pkce).unwrap_or_default();

    Cookie::build((name.to_string(), value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(AUTH_PATH)
        .max_age(PKCE_COOKIE_TTL)
        .build()
}

/// Read the login cookie. An undecryptable or malformed value counts as absent.
pub fn read_pkce(jar: &PrivateCookieJar, name: &str) -> Option<PkceState> {
    let cookie = jar.get(name)?;
    serde_json::from_str(cookie.value()).ok()
}

/// Removal cookie for the login cookie.
pub fn clear_pkce(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), "")).path(AUTH_PATH).build()
}

/// Create the session cookie.
pub fn session_cookie(name: &str, session_id: &str, ttl: StdDuration, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), session_id.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age(ttl))
        .build()
}

/// Create the CSRF companion cookie (not HttpOnly).
pub fn csrf_cookie(name: &str, csrf_token: &str, ttl: StdDuration, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), csrf_token.to_string()))
        .http_only(false)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age(ttl))
        .build()
}

/// Removal cookie for a root-scoped cookie.
pub fn clear_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), "")).path("/").build()
}

/// Accept only same-origin relative paths as a post-login target.
pub fn sanitize_return_to(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let same_origin = raw.starts_with('/')
        && !raw.starts_with("//")
        && !raw.starts_with("/\\")
        && !raw.chars().any(|c| c.is_control());
    same_origin.then(|| raw.to_string())
}
