//! Keyed token storage for civic-link sessions.
//!
//! The session manager persists three entries (access token, refresh token,
//! serialized profile) through the [`TokenStore`] trait, so the backend can be
//! a file, an OS keychain, browser storage, or plain memory.
//!
//! Stores that are shared between several contexts (windows, tabs, processes)
//! expose a change registry via [`TokenStore::changes`].  A session listening
//! to it treats an externally cleared access token as a logout performed
//! elsewhere.

mod file;

pub use file::FileTokenStore;

use crate::error::Result;
use crate::event_handlers::Listeners;
use std::collections::HashMap;
use std::sync::Mutex;

/// A single key change observed on a [`TokenStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// Key that changed
    pub key: String,
    /// New value, `None` when the key was removed
    pub new_value: Option<String>,
}

/// Trait for token storage backends.
///
/// # Security Note
///
/// Implementations MUST ensure tokens are stored securely:
/// - Files should use restrictive permissions (0600 on Unix)
/// - Tokens should never be logged
pub trait TokenStore: Send + Sync + 'static {
    /// Read a single entry. Returns `Ok(None)` if the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write several entries as one batch; either all are visible or none.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()>;

    /// Remove several entries as one batch. Missing keys are ignored.
    fn remove_many(&self, keys: &[&str]) -> Result<()>;

    /// Change notifications, if this backend can deliver them.
    fn changes(&self) -> Option<Listeners<StorageChange>> {
        None
    }

    /// Check if an entry exists.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Apply `updates` to `map`, returning the changes that actually altered it.
pub(crate) fn apply_updates(
    map: &mut HashMap<String, String>,
    updates: impl IntoIterator<Item = (String, Option<String>)>,
) -> Vec<StorageChange> {
    let mut changes = Vec::new();
    for (key, value) in updates {
        let previous = match &value {
            Some(v) => map.insert(key.clone(), v.clone()),
            None => map.remove(&key),
        };
        if previous != value {
            changes.push(StorageChange {
                key,
                new_value: value,
            });
        }
    }
    changes
}

/// In-memory token store.
///
/// Does NOT persist across restarts. Wrap it in an `Arc` and hand the same
/// instance to several session managers to model contexts sharing storage;
/// every effective write is broadcast to [`TokenStore::changes`] listeners.
///
/// # Example
///
/// ```rust
/// use civic_link::storage::{MemoryTokenStore, TokenStore};
///
/// let store = MemoryTokenStore::new();
/// store.set_many(&[("k", "v")]).unwrap();
/// assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
/// ```
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
    listeners: Listeners<StorageChange>,
}

impl std::fmt::Debug for MemoryTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.entries.lock().map(|e| e.len()).unwrap_or(0);
        f.debug_struct("MemoryTokenStore").field("keys", &keys).finish()
    }
}

impl MemoryTokenStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&self, updates: Vec<(String, Option<String>)>) {
        let changes = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            apply_updates(&mut entries, updates)
        };
        for change in &changes {
            self.listeners.emit(change);
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        self.apply(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), Some(v.to_string())))
                .collect(),
        );
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        self.apply(keys.iter().map(|k| (k.to_string(), None)).collect());
        Ok(())
    }

    fn changes(&self) -> Option<Listeners<StorageChange>> {
        Some(self.listeners.clone())
    }
}
