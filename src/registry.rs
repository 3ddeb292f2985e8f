//! Concurrent registry of pending upload sessions
//!
//! Every resolution path (complete, abort, expiry) goes through [`take`] or
//! [`take_if`], which remove the entry under the shard lock. Whichever caller
//! gets the session back owns its remote cleanup; every other caller sees
//! `None` and must not touch the backend.
//!
//! [`take`]: SessionRegistry::take
//! [`take_if`]: SessionRegistry::take_if

use crate::session::{UploadHandle, UploadSession};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<UploadHandle, UploadSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fully initialized session.
    pub fn insert(&self, session: UploadSession) {
        self.sessions.insert(session.handle.clone(), session);
    }

    /// Snapshot of a pending session. Does not resolve it.
    pub fn get(&self, handle: &UploadHandle) -> Option<UploadSession> {
        self.sessions.get(handle).map(|s| s.value().clone())
    }

    /// Atomically remove and return a session.
    pub fn take(&self, handle: &UploadHandle) -> Option<UploadSession> {
        self.sessions.remove(handle).map(|(_, s)| s)
    }

    /// Atomically remove and return a session if `predicate` holds for it.
    pub fn take_if(
        &self,
        handle: &UploadHandle,
        predicate: impl FnOnce(&UploadSession) -> bool,
    ) -> Option<UploadSession> {
        self.sessions
            .remove_if(handle, |_, s| predicate(s))
            .map(|(_, s)| s)
    }

    /// Handles of sessions older than `ttl` at `now`.
    ///
    /// The result is only a candidate list; callers still go through
    /// [`take_if`](Self::take_if) to claim each one.
    pub fn expired_handles(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<UploadHandle> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_expired(now, ttl))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Handle of the session bound to a backend multipart id, if any.
    pub fn handle_for_remote(&self, remote_session_id: &str) -> Option<UploadHandle> {
        self.sessions
            .iter()
            .find(|entry| entry.value().remote_session_id == remote_session_id)
            .map(|entry| entry.key().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
