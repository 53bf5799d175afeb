//! Redis session store.
//!
//! Records are JSON strings under `<prefix>session:<id>`:
//! - create uses `SET NX EX` so an id is never reused
//! - sliding reads use `GETEX ... EX` so read and extend are one command
//! - token updates run as a Lua script that rewrites only the token fields
//!   with `SET ... KEEPTTL`, so the remaining TTL and CSRF token survive
//! - advisory locks use `SET NX PX` and a compare-and-delete unlock

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::model::{Session, SessionId, SessionRecord, TokenSet};
use crate::store::{LockToken, SessionStore, new_lock_token};

const UPDATE_TOKENS_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end
local record = cjson.decode(raw)
local tokens = cjson.decode(ARGV[1])
record.access_token = tokens.access_token
record.refresh_token = tokens.refresh_token
record.id_token = tokens.id_token
record.expires_at = tokens.expires_at
redis.call('SET', KEYS[1], cjson.encode(record), 'KEEPTTL')
return 1
"#;

const UNLOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Production session store backed by Redis.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    config: StoreConfig,
    update_script: Script,
    unlock_script: Script,
}

impl std::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisSessionStore {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str, config: StoreConfig) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| StoreError::Backend(format!("Failed to create Redis client: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Backend(format!("Failed to create Redis connection manager: {}", e))
        })?;

        tracing::info!(
            ttl_secs = config.ttl_secs(),
            sliding = config.sliding,
            prefix = %config.key_prefix,
            "Connected to Redis session store"
        );

        Ok(Self::with_connection(conn, config))
    }

    /// Use an existing connection manager.
    pub fn with_connection(conn: ConnectionManager, config: StoreConfig) -> Self {
        Self {
            conn,
            config,
            update_script: Script::new(UPDATE_TOKENS_SCRIPT),
            unlock_script: Script::new(UNLOCK_SCRIPT),
        }
    }

    fn decode(id: &SessionId, raw: Option<String>) -> Result<Option<Session>> {
        match raw {
            Some(raw) => {
                let record = SessionRecord::from_json(&raw)?;
                Ok(Some(Session::from_record(id.clone(), record)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, session: &Session) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = self.config.session_key(session.id().as_str());
        let payload = session.to_record().to_json()?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(self.config.ttl_secs())
            .query_async(&mut conn)
            .await?;

        if reply.is_none() {
            return Err(StoreError::AlreadyExists(session.id().short().to_string()));
        }

        tracing::debug!(session = %session.id().short(), "Session created");
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        if !self.config.sliding {
            return self.peek(id).await;
        }

        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GETEX")
            .arg(self.config.session_key(id.as_str()))
            .arg("EX")
            .arg(self.config.ttl_secs())
            .query_async(&mut conn)
            .await?;

        Self::decode(id, raw)
    }

    async fn peek(&self, id: &SessionId) -> Result<Option<Session>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.config.session_key(id.as_str()))
            .query_async(&mut conn)
            .await?;

        Self::decode(id, raw)
    }

    async fn touch(&self, id: &SessionId) -> Result<bool> {
        let mut conn = self.conn.clone();
        let key = self.config.session_key(id.as_str());

        if !self.config.sliding {
            let exists: i64 = redis::cmd("EXISTS").arg(&key).query_async(&mut conn).await?;
            return Ok(exists == 1);
        }

        let updated: i64 = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(self.config.ttl_secs())
            .query_async(&mut conn)
            .await?;
        Ok(updated == 1)
    }

    async fn update(&self, id: &SessionId, tokens: &TokenSet) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(tokens)?;

        let updated: i64 = self
            .update_script
            .key(self.config.session_key(id.as_str()))
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;

        if updated == 0 {
            return Err(StoreError::NotFound(id.short().to_string()));
        }

        tracing::debug!(session = %id.short(), "Session tokens replaced");
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(self.config.session_key(id.as_str()))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let mut conn = self.conn.clone();
        let token = new_lock_token();
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.config.lock_key(name))
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| token))
    }

    async fn unlock(&self, name: &str, token: &LockToken) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .unlock_script
            .key(self.config.lock_key(name))
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    fn config(&self) -> &StoreConfig {
        &self.config
    }
}
