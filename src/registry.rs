//! Client registry
//!
//! The shared set of active sessions, keyed by `ClientId`.
//!
//! Lock ordering: the registry lock is taken first and only long enough to
//! mutate the map or clone a snapshot. Per-session output locks are taken
//! afterwards by `Session::send`, which never touches the registry. The
//! registry guard is a `std::sync::MutexGuard` and therefore `!Send`, so a
//! spawned task cannot hold it across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::join_all;
use tracing::debug;

use crate::session::Session;
use crate::types::ClientId;

/// Registry of connected sessions
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<HashMap<ClientId, Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session under its id
    ///
    /// Ids are unique per connection, so this never replaces a live entry.
    pub fn add(&self, session: Arc<Session>) {
        let mut sessions = self.lock();
        sessions.insert(session.id(), session);
        debug!("Total sessions: {}", sessions.len());
    }

    /// Remove a session, returning it if it was present
    pub fn remove(&self, id: ClientId) -> Option<Arc<Session>> {
        let mut sessions = self.lock();
        let removed = sessions.remove(&id);
        debug!("Total sessions: {}", sessions.len());
        removed
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of sessions, registered or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of sessions that have completed registration
    pub fn registered_count(&self) -> usize {
        self.lock().values().filter(|s| s.is_registered()).count()
    }

    /// Current sessions, optionally without `exclude`
    pub fn snapshot(&self, exclude: Option<ClientId>) -> Vec<Arc<Session>> {
        self.lock()
            .values()
            .filter(|s| Some(s.id()) != exclude)
            .cloned()
            .collect()
    }

    /// Send an encoded frame to every session except `exclude`
    ///
    /// Delivery goes to the sessions present when the snapshot is taken.
    /// A failed write only affects that recipient.
    pub async fn broadcast(&self, frame: &[u8], exclude: Option<ClientId>) {
        let recipients = self.snapshot(exclude);
        join_all(recipients.iter().map(|session| session.send(frame))).await;
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, Arc<Session>>> {
        // A panic elsewhere cannot leave the map half-updated
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
