//! Session storage.
//!
//! The engine never holds game state itself; it loads a [`GameSession`] from
//! a [`SessionStore`], works on a copy, and writes the copy back only when an
//! operation succeeds.
//!
//! [`MemoryStore`] keeps each record as serialized JSON, the same shape a
//! cookie- or database-backed store would hold, so every load goes through
//! deserialization and [`GameSession::validate`]. A record that fails either
//! step is dropped and reported as absent; the next operation starts a fresh
//! game instead of acting on a corrupt one.
//!
//! The store is bounded: once it holds `max_sessions` records, adding a new
//! session evicts the one used least recently.

use crate::session::GameSession;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Opaque key of a browser session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keyed storage for game sessions.
pub trait SessionStore: Send + Sync {
    /// Load a session. Missing and invalid records both return `Ok(None)`.
    fn get(&self, id: &SessionId) -> Result<Option<GameSession>, StoreError>;

    fn put(&self, id: &SessionId, session: &GameSession) -> Result<(), StoreError>;

    fn delete(&self, id: &SessionId) -> Result<(), StoreError>;
}

/// Parse and validate a stored record.
pub fn decode_session(id: &SessionId, raw: &str) -> Option<GameSession> {
    let session: GameSession = match serde_json::from_str(raw) {
        Ok(s) => s,
        Err(e) => {
            warn!(session = %id, error = %e, "discarding unparseable session record");
            return None;
        }
    };
    if let Err(reason) = session.validate() {
        warn!(session = %id, %reason, "discarding invalid session record");
        return None;
    }
    Some(session)
}

/// Default cap on the number of sessions a [`MemoryStore`] keeps.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

#[derive(Debug)]
struct Record {
    raw: String,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Records {
    entries: HashMap<SessionId, Record>,
    clock: u64,
}

impl Records {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Drop the least recently used record.
    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, record)| record.last_used)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            self.entries.remove(&id);
            debug!(session = %id, "evicted idle session");
        }
    }
}

/// In-process store holding at most `max_sessions` records. Adding a
/// session beyond the cap evicts the least recently used one.
#[derive(Debug)]
pub struct MemoryStore {
    records: Mutex<Records>,
    max_sessions: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_SESSIONS)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_sessions: usize) -> Self {
        Self {
            records: Mutex::new(Records::default()),
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store raw text under an id, bypassing serialization.
    #[cfg(test)]
    pub fn put_raw(&self, id: &SessionId, raw: &str) {
        let mut records = self.records.lock();
        let last_used = records.tick();
        records.entries.insert(
            id.clone(),
            Record {
                raw: raw.to_string(),
                last_used,
            },
        );
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, id: &SessionId) -> Result<Option<GameSession>, StoreError> {
        let raw = {
            let mut records = self.records.lock();
            let now = records.tick();
            records.entries.get_mut(id).map(|record| {
                record.last_used = now;
                record.raw.clone()
            })
        };
        Ok(raw.and_then(|raw| decode_session(id, &raw)))
    }

    fn put(&self, id: &SessionId, session: &GameSession) -> Result<(), StoreError> {
        let raw = serde_json::to_string(session)?;
        let mut records = self.records.lock();
        if !records.entries.contains_key(id) && records.entries.len() >= self.max_sessions {
            records.evict_oldest();
        }
        let last_used = records.tick();
        records.entries.insert(id.clone(), Record { raw, last_used });
        Ok(())
    }

    fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        self.records.lock().entries.remove(id);
        Ok(())
    }
}
