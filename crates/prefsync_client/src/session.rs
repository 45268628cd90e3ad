//! Session identity headers.

use crate::state_store::{state_keys, SharedStateStore};
use prefsync_protocol::{headers, HeaderMap};
use uuid::Uuid;

/// Maintains the machine and user session identifiers.
///
/// The machine session id is minted locally on first use and survives
/// until the session state is purged. The user session id mirrors the
/// server session observed in the last manifest; echoing it back lets the
/// server correlate requests and notice stale clients.
pub struct SessionTracker {
    store: SharedStateStore,
}

impl SessionTracker {
    /// Creates a tracker over the given state store.
    pub fn new(store: SharedStateStore) -> Self {
        SessionTracker { store }
    }

    /// Adds session headers to a request, minting the machine id if needed.
    ///
    /// The user session header is attached only once a server session has
    /// been observed.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let machine = match self.store.get(state_keys::MACHINE_SESSION_ID) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                self.store.set(state_keys::MACHINE_SESSION_ID, &id);
                id
            }
        };
        headers.set(headers::MACHINE_SESSION_ID, machine);
        if let Some(user) = self.store.get(state_keys::USER_SESSION_ID) {
            headers.set(headers::USER_SESSION_ID, user);
        }
    }

    /// Returns the cached server session id, if any.
    pub fn user_session_id(&self) -> Option<String> {
        self.store.get(state_keys::USER_SESSION_ID)
    }

    /// Records the server session id observed in a manifest.
    pub fn set_user_session_id(&self, session: &str) {
        self.store.set(state_keys::USER_SESSION_ID, session);
    }

    /// Purges both identifiers. The next request mints a fresh machine id.
    pub fn clear(&self) {
        self.store.remove(state_keys::MACHINE_SESSION_ID);
        self.store.remove(state_keys::USER_SESSION_ID);
        tracing::debug!("purged sync session identifiers");
    }
}
