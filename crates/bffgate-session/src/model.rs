//! Session data model and its stored wire format.

use std::fmt;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const ID_BYTES: usize = 32;
const SHORT_ID_LEN: usize = 8;

fn random_token() -> String {
    let mut bytes = [0u8; ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Opaque, unguessable session identifier. Also the session cookie value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(random_token())
    }

    /// Wrap an id taken from a cookie.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix safe to put in logs.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(SHORT_ID_LEN)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}..)", self.short())
    }
}

/// The replaceable part of a session. Always written as a unit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    /// Absolute access-token expiry.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            id_token,
            expires_at,
        }
    }

    /// Whether the access token may still be forwarded: `now < expires_at - skew`.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        let skew = chrono::Duration::from_std(skew).unwrap_or(chrono::Duration::zero());
        now < self.expires_at - skew
    }

    /// The token set after a refresh.
    ///
    /// Providers may omit the refresh token or id token on refresh; the prior
    /// values are retained in that case.
    pub fn refreshed(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
            id_token: id_token.or_else(|| self.id_token.clone()),
            expires_at,
        }
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// An authenticated browser session.
///
/// Only the [`TokenSet`] can change after creation.
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    tokens: TokenSet,
    csrf_token: String,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Issue a new session with a fresh random id and CSRF token.
    pub fn issue(tokens: TokenSet) -> Self {
        Self {
            id: SessionId::generate(),
            tokens,
            csrf_token: random_token(),
            created_at: Utc::now(),
        }
    }

    /// Rebuild a session from its stored record.
    pub fn from_record(id: SessionId, record: SessionRecord) -> Self {
        Self {
            id,
            created_at: record.created_at.unwrap_or_else(Utc::now),
            tokens: record.tokens,
            csrf_token: record.csrf_token,
        }
    }

    /// The record written to the store.
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            tokens: self.tokens.clone(),
            csrf_token: self.csrf_token.clone(),
            created_at: Some(self.created_at),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Same session with a new token set.
    pub fn with_tokens(mut self, tokens: TokenSet) -> Self {
        self.tokens = tokens;
        self
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("tokens", &self.tokens)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Stored JSON form of a session:
/// `{access_token, refresh_token, id_token, expires_at, csrf_token, created_at}`
/// with timestamps in unix seconds.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(flatten)]
    pub tokens: TokenSet,
    pub csrf_token: String,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
