//! Requester abstraction.
//!
//! The client core never opens sockets. It hands [`WireRequest`] values to
//! a [`Requester`] supplied by the embedder, which owns connections, TLS
//! and timeouts. Failures are reported through [`RequestFailure`] so the
//! classifier can map them onto the error taxonomy without inspecting
//! transport internals.

use async_trait::async_trait;
use parking_lot::Mutex;
use prefsync_protocol::{WireRequest, WireResponse};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Ways a requester can fail without producing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The exchange did not complete in time.
    Timeout,
    /// The URL scheme or HTTP version is not supported.
    ProtocolNotSupported,
    /// The request path contains characters that were not escaped.
    PathNotEscaped,
    /// The request headers could not be encoded.
    HeadersNotObject,
    /// The exchange was canceled before it completed.
    Canceled,
    /// Any other transport failure.
    Failed,
}

/// A failure reported by a requester in place of a response.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RequestFailure {
    /// How the exchange failed.
    pub kind: FailureKind,
    /// Human-readable description.
    pub message: String,
}

impl RequestFailure {
    /// Creates a failure.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        RequestFailure {
            kind,
            message: message.into(),
        }
    }

    /// Creates a timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        RequestFailure::new(FailureKind::Timeout, message)
    }

    /// Creates a cancellation failure.
    pub fn canceled() -> Self {
        RequestFailure::new(FailureKind::Canceled, "request was canceled")
    }

    /// Creates a generic transport failure.
    pub fn failed(message: impl Into<String>) -> Self {
        RequestFailure::new(FailureKind::Failed, message)
    }
}

/// Performs HTTP exchanges on behalf of the store client.
///
/// Implementations should honor `cancel` by abandoning the exchange and
/// returning a [`FailureKind::Canceled`] failure. The client also races
/// the token itself, so an implementation that ignores it merely wastes
/// work; it never blocks callers.
#[async_trait]
pub trait Requester: Send + Sync {
    /// Performs one exchange.
    async fn request(
        &self,
        request: WireRequest,
        cancel: CancellationToken,
    ) -> Result<WireResponse, RequestFailure>;
}

#[async_trait]
impl<T: Requester + ?Sized> Requester for Arc<T> {
    async fn request(
        &self,
        request: WireRequest,
        cancel: CancellationToken,
    ) -> Result<WireResponse, RequestFailure> {
        (**self).request(request, cancel).await
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Respond(WireResponse),
    Fail(RequestFailure),
    Hang,
}

/// A requester for tests that replays scripted outcomes in order.
///
/// Every request consumes the next outcome; running past the script is a
/// transport failure. Requests are recorded for inspection.
#[derive(Debug, Default)]
pub struct MockRequester {
    script: Mutex<VecDeque<Scripted>>,
    seen: Mutex<Vec<WireRequest>>,
}

impl MockRequester {
    /// Creates a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: WireResponse) {
        self.script.lock().push_back(Scripted::Respond(response));
    }

    /// Queues a failure.
    pub fn push_failure(&self, failure: RequestFailure) {
        self.script.lock().push_back(Scripted::Fail(failure));
    }

    /// Queues an exchange that never completes.
    pub fn push_hang(&self) {
        self.script.lock().push_back(Scripted::Hang);
    }

    /// Returns every request seen so far.
    pub fn requests(&self) -> Vec<WireRequest> {
        self.seen.lock().clone()
    }

    /// Returns how many requests reached the mock.
    pub fn request_count(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl Requester for MockRequester {
    async fn request(
        &self,
        request: WireRequest,
        _cancel: CancellationToken,
    ) -> Result<WireResponse, RequestFailure> {
        self.seen.lock().push(request);
        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(failure)) => Err(failure),
            Some(Scripted::Hang) => {
                std::future::pending::<Result<WireResponse, RequestFailure>>().await
            }
            None => Err(RequestFailure::failed("no scripted response set")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefsync_protocol::Method;

    #[tokio::test]
    async fn mock_replays_outcomes_in_order() {
        let mock = MockRequester::new();
        mock.push_response(WireResponse::new(200));
        mock.push_failure(RequestFailure::timeout("too slow"));

        let request = WireRequest::new(Method::Get, "https://sync.example/v1/manifest");
        let cancel = CancellationToken::new();

        let first = mock.request(request.clone(), cancel.clone()).await.unwrap();
        assert_eq!(first.status, 200);

        let second = mock.request(request.clone(), cancel.clone()).await.unwrap_err();
        assert_eq!(second.kind, FailureKind::Timeout);

        let third = mock.request(request, cancel).await.unwrap_err();
        assert_eq!(third.kind, FailureKind::Failed);
        assert_eq!(mock.request_count(), 3);
    }

    #[tokio::test]
    async fn arc_requesters_delegate() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(WireResponse::new(204));
        let request = WireRequest::new(Method::Delete, "https://sync.example/v1/resource");
        let response = Requester::request(&mock, request, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 204);
    }
}
