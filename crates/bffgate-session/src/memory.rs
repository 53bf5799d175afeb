//! In-process session store for tests and single-node local development.
//!
//! Records are kept in their stored JSON form and expire against
//! `tokio::time::Instant`, so behavior matches the Redis backend and a paused
//! test clock drives expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::model::{Session, SessionId, SessionRecord, TokenSet};
use crate::store::{LockToken, SessionStore, new_lock_token};

#[derive(Debug)]
struct Entry {
    raw: String,
    deadline: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.deadline
    }
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, Entry>,
    locks: HashMap<String, Entry>,
}

impl Inner {
    /// Drop expired sessions and locks. Called on every insert.
    fn sweep(&mut self, now: Instant) {
        self.sessions.retain(|_, e| e.is_live(now));
        self.locks.retain(|_, e| e.is_live(now));
    }
}

/// Session store held in process memory.
#[derive(Debug)]
pub struct MemorySessionStore {
    inner: Mutex<Inner>,
    config: StoreConfig,
}

impl MemorySessionStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .sessions
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored JSON for a session, if live.
    pub fn raw_record(&self, id: &SessionId) -> Option<String> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .sessions
            .get(id.as_str())
            .filter(|e| e.is_live(now))
            .map(|e| e.raw.clone())
    }

    /// Remaining TTL of a session, if live.
    pub fn ttl(&self, id: &SessionId) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .sessions
            .get(id.as_str())
            .filter(|e| e.is_live(now))
            .map(|e| e.deadline - now)
    }

    fn read(&self, id: &SessionId, slide: bool) -> Result<Option<Session>> {
        let now = Instant::now();
        let raw = {
            let mut inner = self.inner.lock();
            match inner.sessions.get_mut(id.as_str()) {
                Some(entry) if entry.is_live(now) => {
                    if slide {
                        entry.deadline = now + self.config.ttl;
                    }
                    Some(entry.raw.clone())
                }
                Some(_) => {
                    inner.sessions.remove(id.as_str());
                    None
                }
                None => None,
            }
        };

        match raw {
            Some(raw) => {
                let record = SessionRecord::from_json(&raw)?;
                Ok(Some(Session::from_record(id.clone(), record)))
            }
            None => Ok(None),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> Result<()> {
        let raw = session.to_record().to_json()?;
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.sweep(now);

        let key = session.id().as_str();
        if inner.sessions.get(key).is_some_and(|e| e.is_live(now)) {
            return Err(StoreError::AlreadyExists(session.id().short().to_string()));
        }

        inner.sessions.insert(
            key.to_string(),
            Entry {
                raw,
                deadline: now + self.config.ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        self.read(id, self.config.sliding)
    }

    async fn peek(&self, id: &SessionId) -> Result<Option<Session>> {
        self.read(id, false)
    }

    async fn touch(&self, id: &SessionId) -> Result<bool> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(id.as_str()) {
            Some(entry) if entry.is_live(now) => {
                if self.config.sliding {
                    entry.deadline = now + self.config.ttl;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update(&self, id: &SessionId, tokens: &TokenSet) -> Result<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let entry = inner
            .sessions
            .get_mut(id.as_str())
            .filter(|e| e.is_live(now))
            .ok_or_else(|| StoreError::NotFound(id.short().to_string()))?;

        let mut record = SessionRecord::from_json(&entry.raw)?;
        record.tokens = tokens.clone();
        entry.raw = record.to_json()?;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        self.inner.lock().sessions.remove(id.as_str());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.sweep(now);

        if inner.locks.get(name).is_some_and(|e| e.is_live(now)) {
            return Ok(None);
        }

        let token = new_lock_token();
        inner.locks.insert(
            name.to_string(),
            Entry {
                raw: token.as_str().to_string(),
                deadline: now + ttl,
            },
        );
        Ok(Some(token))
    }

    async fn unlock(&self, name: &str, token: &LockToken) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.locks.get(name).is_some_and(|e| e.raw == token.as_str()) {
            inner.locks.remove(name);
        }
        Ok(())
    }

    fn config(&self) -> &StoreConfig {
        &self.config
    }
}
