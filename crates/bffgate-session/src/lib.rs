//! Session store for the bffgate gateway.
//!
//! One record per browser session, keyed by an opaque id and held in a
//! TTL-backed key-value store:
//! - [`RedisSessionStore`] for production, safe across process replicas
//! - [`MemorySessionStore`] for tests and single-node local development
//!
//! # Example
//!
//! ```rust,ignore
//! use bffgate_session::{RedisSessionStore, Session, SessionStore, StoreConfig};
//!
//! let config = StoreConfig::default()
//!     .with_ttl(Duration::from_secs(3600))
//!     .with_sliding(true);
//!
//! let store = RedisSessionStore::connect("redis://127.0.0.1:6379", config).await?;
//! store.create(&Session::issue(tokens)).await?;
//! ```

mod config;
mod error;
mod memory;
mod model;
mod redis_store;
mod store;

pub use config::{DEFAULT_KEY_PREFIX, DEFAULT_TTL, StoreConfig};
pub use error::{Result, StoreError};
pub use memory::MemorySessionStore;
pub use model::{Session, SessionId, SessionRecord, TokenSet};
pub use redis_store::RedisSessionStore;
pub use store::{LockToken, SessionStore, SharedSessionStore};
