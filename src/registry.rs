//! Session registry
//!
//! Tracks which sessions are online from each address key. Every
//! operation takes the map lock for exactly one read or mutation, so
//! callers always observe a whole set, never one mid-update.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::policy::{decide, Verdict};

/// Outcome of [`SessionRegistry::try_register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AtCapacity,
    /// The session is already online, under the contained key.
    AlreadyOnline(String),
}

#[derive(Debug, Default)]
struct Sessions {
    /// Address key → set of session identifiers online from it.
    /// An entry exists only while its set is non-empty.
    by_address: HashMap<String, HashSet<String>>,
    /// Session identifier → the one key it is registered under.
    by_session: HashMap<String, String>,
}

impl Sessions {
    fn insert(&mut self, key: &str, session_id: &str) {
        self.by_address
            .entry(key.to_string())
            .or_default()
            .insert(session_id.to_string());
        self.by_session
            .insert(session_id.to_string(), key.to_string());
    }
}

/// Sessions online per address key. A session identifier is registered
/// under at most one key at a time.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<Sessions>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-applied change
    // behind (both maps are updated without calling out), so a poisoned
    // map is still accurate.
    fn lock(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of sessions online from `key` (0 when untracked).
    pub fn occupancy(&self, key: &str) -> usize {
        self.lock().by_address.get(key).map(HashSet::len).unwrap_or(0)
    }

    /// Key `session_id` is currently registered under, if any.
    pub fn key_of(&self, session_id: &str) -> Option<String> {
        self.lock().by_session.get(session_id).cloned()
    }

    /// Add `session_id` under `key`.
    ///
    /// Returns `false` and changes nothing when the session is already
    /// registered, at `key` or anywhere else.
    pub fn register(&self, key: &str, session_id: &str) -> bool {
        let mut sessions = self.lock();
        if sessions.by_session.contains_key(session_id) {
            return false;
        }
        sessions.insert(key, session_id);
        true
    }

    /// Check uniqueness and capacity, then register, under one critical
    /// section. The map is untouched unless the result is
    /// [`Registration::Registered`].
    pub fn try_register(
        &self,
        key: &str,
        session_id: &str,
        capacity: u32,
        bypass: bool,
    ) -> Registration {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.by_session.get(session_id) {
            return Registration::AlreadyOnline(existing.clone());
        }

        let occupancy = sessions.by_address.get(key).map(HashSet::len).unwrap_or(0);
        match decide(occupancy, capacity, bypass) {
            Verdict::Admit => {
                sessions.insert(key, session_id);
                Registration::Registered
            }
            Verdict::Deny => Registration::AtCapacity,
        }
    }

    /// Remove `session_id` from `key`, dropping the entry once empty.
    ///
    /// Returns whether anything was removed; unknown keys or sessions are
    /// ignored so late or duplicate disconnects are harmless.
    pub fn deregister(&self, key: &str, session_id: &str) -> bool {
        let mut guard = self.lock();
        let sessions = &mut *guard;
        let Some(ids) = sessions.by_address.get_mut(key) else {
            return false;
        };
        let removed = ids.remove(session_id);
        if ids.is_empty() {
            sessions.by_address.remove(key);
        }
        if removed {
            sessions.by_session.remove(session_id);
        }
        removed
    }

    /// Point-in-time copy of every tracked key and its session count.
    pub fn snapshot_counts(&self) -> HashMap<String, usize> {
        self.lock()
            .by_address
            .iter()
            .map(|(key, ids)| (key.clone(), ids.len()))
            .collect()
    }

    /// Point-in-time copy of the sessions online from `key`.
    pub fn sessions_at(&self, key: &str) -> HashSet<String> {
        self.lock().by_address.get(key).cloned().unwrap_or_default()
    }

    /// Number of tracked address keys.
    pub fn address_count(&self) -> usize {
        self.lock().by_address.len()
    }

    /// Total sessions across all keys.
    pub fn session_count(&self) -> usize {
        self.lock().by_session.len()
    }
}
