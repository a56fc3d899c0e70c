//! Process-wide table of live sessions keyed by connection identifier.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{ConnectionId, SessionHandle};

/// Concurrency-safe registry of open sessions.
///
/// Insertion fails closed: an identifier that is already present is never
/// overwritten. Removal only drops the entry owned by the given handle, so a
/// rejected duplicate cannot evict the session that got there first.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, SessionHandle>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `handle` unless its identifier is taken; returns whether it was
    /// inserted.
    pub fn try_register(&self, handle: &SessionHandle) -> bool {
        match self.sessions.entry(handle.id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
                true
            }
        }
    }

    /// Removes `handle` if it is the registered owner of its identifier.
    /// Repeated calls are harmless.
    pub fn unregister(&self, handle: &SessionHandle) -> bool {
        self.sessions
            .remove_if(handle.id(), |_, registered| registered.same_session(handle))
            .is_some()
    }

    /// The live session registered under `id`.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of the registered handles.
    #[must_use]
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Asks every registered session to close; returns how many were asked.
    pub fn request_close_all(&self) -> usize {
        let handles = self.handles();
        for handle in &handles {
            handle.request_close();
        }
        handles.len()
    }
}
