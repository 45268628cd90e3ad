//! Local request budget.

use crate::classify;
use crate::error::{StoreError, StoreErrorKind, StoreResult};
use crate::requester::{RequestFailure, Requester};
use parking_lot::Mutex;
use prefsync_protocol::{WireRequest, WireResponse};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sliding window over recent requests.
///
/// The window opens at the first admitted request and restarts once more
/// than the interval has passed since then. URLs are retained so a refusal
/// can be diagnosed from logs.
#[derive(Debug, Default)]
struct RateWindow {
    requests: Vec<String>,
    started: Option<Instant>,
}

impl RateWindow {
    /// Records a request if the budget allows it.
    fn admit(&mut self, url: &str, limit: usize, interval: Duration, now: Instant) -> bool {
        if let Some(started) = self.started {
            if now.duration_since(started) > interval {
                self.requests.clear();
                self.started = None;
            }
        }
        if self.requests.len() >= limit {
            return false;
        }
        if self.started.is_none() {
            self.started = Some(now);
        }
        self.requests.push(url.to_owned());
        true
    }
}

/// Applies the local request budget and cancellation to every exchange.
///
/// The session wraps the embedder's requester. Exchanges refused by the
/// budget fail with [`StoreErrorKind::LocalTooManyRequests`] before the
/// requester is touched; refused exchanges still count nothing against the
/// window. Cancellation wins races against the requester's own completion,
/// so a canceled operation always reports
/// [`StoreErrorKind::RequestCanceled`].
pub struct RequestSession<R> {
    requester: R,
    limit: usize,
    interval: Duration,
    window: Mutex<RateWindow>,
}

impl<R: Requester> RequestSession<R> {
    /// Creates a session allowing `limit` requests per `interval`.
    pub fn new(requester: R, limit: usize, interval: Duration) -> Self {
        RequestSession {
            requester,
            limit,
            interval,
            window: Mutex::new(RateWindow::default()),
        }
    }

    /// Returns the number of requests allowed per window.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the window length.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Performs one exchange within the budget.
    pub async fn request(
        &self,
        request: WireRequest,
        cancel: &CancellationToken,
    ) -> StoreResult<WireResponse> {
        let url = request.url.clone();
        let admitted = self
            .window
            .lock()
            .admit(&url, self.limit, self.interval, Instant::now());
        if !admitted {
            tracing::warn!(url = %url, limit = self.limit, "local request budget exhausted");
            return Err(StoreError::local(
                StoreErrorKind::LocalTooManyRequests,
                url.as_str(),
                format!(
                    "request budget exhausted: only {} requests are allowed every {}s",
                    self.limit,
                    self.interval.as_secs()
                ),
            ));
        }
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RequestFailure::canceled()),
            outcome = self.requester.request(request, cancel.clone()) => outcome,
        };
        outcome.map_err(|failure| classify::failure_error(&url, &failure))
    }
}
