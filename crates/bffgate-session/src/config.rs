//! Configuration for the session store.

use std::time::Duration;

/// Default store-level TTL for sessions (8 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Default namespace prefix for every key the store writes.
pub const DEFAULT_KEY_PREFIX: &str = "bff:";

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store-level time-to-live, independent of access-token expiry.
    pub ttl: Duration,

    /// Whether a successful read re-extends the TTL by the full window.
    /// When false, a session strictly expires at `created_at + ttl`.
    pub sliding: bool,

    /// Key namespace prefix.
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            sliding: true,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable sliding expiration.
    pub fn with_sliding(mut self, sliding: bool) -> Self {
        self.sliding = sliding;
        self
    }

    /// Set the key namespace prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Key holding a session record.
    pub fn session_key(&self, id: &str) -> String {
        format!("{}session:{}", self.key_prefix, id)
    }

    /// Key holding an advisory lock.
    pub fn lock_key(&self, name: &str) -> String {
        format!("{}lock:{}", self.key_prefix, name)
    }

    /// TTL in whole seconds, never zero.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}
