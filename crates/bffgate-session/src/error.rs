//! Error types for session store operations.

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with this id already exists.
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    /// No record with this id (absent or expired).
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The backing store could not be reached or rejected the command.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
