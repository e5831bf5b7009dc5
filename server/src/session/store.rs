//! Session storage
//!
//! The store maps a session id to a [`SharedSession`]. Each entry carries its own
//! lock, so requests against different sessions never contend with each other.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::state::{Session, SessionError, SessionId};

/// A stored session behind its per-session lock
pub type SharedSession = Arc<Mutex<Session>>;

/// Trait for session backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session keyed by its owner, replacing any existing one
    async fn create(&self, session: Session) -> Result<SharedSession, SessionError>;

    /// Insert a session keyed by its owner, failing if one already exists
    async fn try_create(&self, session: Session) -> Result<SharedSession, SessionError>;

    /// Look up a session
    async fn get(&self, id: &str) -> Result<SharedSession, SessionError>;

    /// Remove a session. Removing a missing session is not an error.
    async fn delete(&self, id: &str) -> Result<(), SessionError>;

    /// Remove a session only if `id` still maps to `expected`.
    ///
    /// Returns whether the entry was removed. A session re-created under the same
    /// id in the meantime is left alone.
    async fn delete_if_same(&self, id: &str, expected: &SharedSession) -> bool;

    /// Number of stored sessions
    async fn count(&self) -> usize;
}

/// In-memory session store. Data is lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, SharedSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: Session) -> Result<SharedSession, SessionError> {
        let id = session.owner().to_string();
        let shared = Arc::new(Mutex::new(session));

        if self.sessions.insert(id.clone(), shared.clone()).is_some() {
            debug!("Replaced existing session {}", id);
        }

        Ok(shared)
    }

    async fn try_create(&self, session: Session) -> Result<SharedSession, SessionError> {
        match self.sessions.entry(session.owner().to_string()) {
            Entry::Occupied(entry) => Err(SessionError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                let shared = Arc::new(Mutex::new(session));
                entry.insert(shared.clone());
                Ok(shared)
            }
        }
    }

    async fn get(&self, id: &str) -> Result<SharedSession, SessionError> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        if self.sessions.remove(id).is_some() {
            debug!("Deleted session {}", id);
        }
        Ok(())
    }

    async fn delete_if_same(&self, id: &str, expected: &SharedSession) -> bool {
        let removed = self
            .sessions
            .remove_if(id, |_, current| Arc::ptr_eq(current, expected))
            .is_some();
        if removed {
            debug!("Deleted session {}", id);
        }
        removed
    }

    async fn count(&self) -> usize {
        self.sessions.len()
    }
}
