//! Server-driven request backoff.

use crate::state_store::{state_keys, SharedStateStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

struct BackoffInner {
    store: SharedStateStore,
    state: Mutex<BackoffState>,
    changes: watch::Sender<Option<Instant>>,
}

#[derive(Default)]
struct BackoffState {
    deadline: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

/// Enforces a server-imposed pause on all requests.
///
/// When the store answers 429 with `Retry-After`, the client records a
/// deadline here. While the deadline lies in the future every operation
/// fails locally without touching the network. The deadline is persisted
/// in wall-clock milliseconds so it survives restarts, and clears itself
/// once it passes. At most one clear timer is outstanding at any time.
pub struct BackoffController {
    inner: Arc<BackoffInner>,
}

impl BackoffController {
    /// Creates a controller, re-arming any persisted deadline that still
    /// lies in the future.
    ///
    /// Must be called from within a Tokio runtime: expiry is driven by a
    /// spawned timer task.
    pub fn new(store: SharedStateStore) -> Self {
        let (changes, _) = watch::channel(None);
        let controller = BackoffController {
            inner: Arc::new(BackoffInner {
                store,
                state: Mutex::new(BackoffState::default()),
                changes,
            }),
        };
        controller.restore();
        controller
    }

    fn restore(&self) {
        let Some(raw) = self.inner.store.get(state_keys::BACKOFF_UNTIL) else {
            return;
        };
        match raw.parse::<u64>().ok().and_then(instant_at_unix_ms) {
            Some(deadline) => {
                tracing::debug!("restoring persisted request backoff");
                self.set_deadline(Some(deadline));
            }
            // Stale or unreadable deadlines are dropped rather than honored.
            None => self.inner.store.remove(state_keys::BACKOFF_UNTIL),
        }
    }

    /// Returns the current deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.state.lock().deadline
    }

    /// Returns whether requests are currently suspended.
    pub fn is_active(&self) -> bool {
        self.deadline()
            .is_some_and(|deadline| Instant::now() < deadline)
    }

    /// Returns how long until the deadline passes.
    ///
    /// `None` when no deadline is set or it has already passed.
    pub fn remaining(&self) -> Option<Duration> {
        let deadline = self.deadline()?;
        let left = deadline.saturating_duration_since(Instant::now());
        (!left.is_zero()).then_some(left)
    }

    /// Observes deadline changes.
    ///
    /// The receiver yields the new deadline on every change, including the
    /// automatic clear once a deadline passes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Instant>> {
        self.inner.changes.subscribe()
    }

    /// Replaces the deadline.
    ///
    /// `Some` persists the deadline and schedules its automatic clear,
    /// replacing any timer already outstanding. `None` clears the deadline
    /// and its persisted form. Setting the deadline already in place is a
    /// no-op and notifies nobody.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        {
            let mut state = self.inner.state.lock();
            if state.deadline == deadline {
                return;
            }
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.deadline = deadline;
            match deadline {
                Some(at) => {
                    self.inner
                        .store
                        .set(state_keys::BACKOFF_UNTIL, &unix_ms_at(at).to_string());
                    let inner = Arc::clone(&self.inner);
                    state.timer = Some(tokio::spawn(async move {
                        sleep_until(at).await;
                        inner.clear_expired(at);
                    }));
                    let remaining_ms =
                        at.saturating_duration_since(Instant::now()).as_millis() as u64;
                    tracing::info!(remaining_ms, "requests suspended by server backoff");
                }
                None => {
                    self.inner.store.remove(state_keys::BACKOFF_UNTIL);
                    tracing::info!("request backoff cleared");
                }
            }
        }
        self.inner.changes.send_replace(deadline);
    }
}

impl Drop for BackoffController {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.state.lock().timer.take() {
            timer.abort();
        }
    }
}

impl BackoffInner {
    /// Clears the deadline a fired timer was armed for.
    ///
    /// A timer can lose the abort race and fire after the deadline was
    /// replaced; comparing against the armed deadline makes that firing
    /// a no-op.
    fn clear_expired(&self, armed: Instant) {
        {
            let mut state = self.state.lock();
            if state.deadline != Some(armed) {
                return;
            }
            state.deadline = None;
            state.timer = None;
            self.store.remove(state_keys::BACKOFF_UNTIL);
        }
        tracing::debug!("request backoff expired");
        self.changes.send_replace(None);
    }
}

/// Converts a deadline to wall-clock Unix milliseconds for persistence.
fn unix_ms_at(deadline: Instant) -> u64 {
    let ahead = deadline.saturating_duration_since(Instant::now());
    unix_ms_now().saturating_add(ahead.as_millis() as u64)
}

/// Converts persisted Unix milliseconds back to a deadline, `None` when
/// the timestamp has already passed.
fn instant_at_unix_ms(millis: u64) -> Option<Instant> {
    let now = unix_ms_now();
    if millis <= now {
        return None;
    }
    Some(Instant::now() + Duration::from_millis(millis - now))
}

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
