//! Durable client state.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Keys this crate writes to the external state store.
pub mod state_keys {
    /// Selected service kind, present only after a switch.
    pub const URL_KIND: &str = "sync.store.url-kind";
    /// Snapshot of the last resolved store descriptor.
    pub const PREVIOUS_STORE: &str = "sync.store.previous";
    /// Machine-scoped session id minted by the client.
    pub const MACHINE_SESSION_ID: &str = "sync.machine-session-id";
    /// Server session id observed in the last manifest.
    pub const USER_SESSION_ID: &str = "sync.user-session-id";
    /// Unix milliseconds before which no request may be sent.
    pub const BACKOFF_UNTIL: &str = "sync.donot-request-until";
}

/// Small key-value persistence supplied by the embedder.
///
/// Backed by whatever the host application uses for profile state. All
/// methods are synchronous and must not block for long; values are short
/// strings.
pub trait StateStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str);

    /// Deletes a value.
    fn remove(&self, key: &str);
}

/// Shared handle to a state store.
pub type SharedStateStore = Arc<dyn StateStore>;

/// An in-memory state store.
///
/// Suitable for tests and for ephemeral clients that do not need state to
/// survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.write().insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}
