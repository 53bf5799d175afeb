//! The session store interface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::model::{Session, SessionId, TokenSet};

/// Opaque owner token returned by [`SessionStore::try_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(pub(crate) String);

impl LockToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// TTL-backed key-value store holding one record per session.
///
/// Implementations must be safe to share between request handlers and,
/// for production backends, between process replicas.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Store a new session with the configured TTL.
    ///
    /// Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, session: &Session) -> Result<()>;

    /// Fetch a session. With sliding enabled, a hit re-extends the TTL.
    async fn get(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Fetch a session without touching its TTL.
    async fn peek(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Re-extend the TTL of an existing session. No-op when sliding is off.
    ///
    /// Returns whether the record still exists.
    async fn touch(&self, id: &SessionId) -> Result<bool>;

    /// Atomically replace the token set, keeping the CSRF token, creation
    /// time and remaining TTL. Fails with `NotFound` if the record is gone.
    async fn update(&self, id: &SessionId, tokens: &TokenSet) -> Result<()>;

    /// Delete a session. Deleting an absent id is not an error.
    async fn delete(&self, id: &SessionId) -> Result<()>;

    /// Check the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Try to take a short-lived advisory lock.
    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>>;

    /// Release a lock if it is still held by `token`.
    async fn unlock(&self, name: &str, token: &LockToken) -> Result<()>;

    fn config(&self) -> &StoreConfig;
}

/// Shared session store handle.
pub type SharedSessionStore = Arc<dyn SessionStore>;

pub(crate) fn new_lock_token() -> LockToken {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use rand::RngCore;

    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    LockToken(URL_SAFE_NO_PAD.encode(bytes))
}
