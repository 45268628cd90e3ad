//! Error types for store operations.

use std::fmt;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Classification of a failed store operation.
///
/// The set is closed: callers branch on kinds to drive retry, re-auth and
/// back-off decisions, so adding a kind is a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// The server rejected the credential, or none was available.
    Unauthorized,
    /// The account is not allowed to use the service.
    Forbidden,
    /// The requested document or version does not exist.
    NotFound,
    /// The method is not supported on the requested path.
    MethodNotFound,
    /// The request conflicts with the server's current state.
    Conflict,
    /// The requested data has been permanently removed.
    Gone,
    /// A guarded write lost the race: the expected ref is stale.
    PreconditionFailed,
    /// The payload exceeds what the service accepts.
    TooLarge,
    /// The server requires a newer client.
    UpgradeRequired,
    /// The server is throttling and gave no resume hint.
    TooManyRequests,
    /// The server is throttling and supplied a `Retry-After` delay.
    TooManyRequestsAndRetryAfter,
    /// The local request budget is exhausted; nothing was sent.
    LocalTooManyRequests,
    /// The transport failed without producing a response.
    RequestFailed,
    /// The transport timed out.
    RequestTimeout,
    /// The transport does not support the requested protocol.
    RequestProtocolNotSupported,
    /// The request path contains unescaped characters.
    RequestPathNotEscaped,
    /// The request headers could not be encoded.
    RequestHeadersNotObject,
    /// The operation was canceled by the caller.
    RequestCanceled,
    /// A response that must carry a ref did not.
    NoRef,
    /// A collection create returned no collection id.
    NoCollection,
    /// A response that must carry content was empty.
    EmptyResponse,
    /// Anything the classifier cannot place.
    Unknown,
}

impl StoreErrorKind {
    /// Returns a stable, human-readable name for logs and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::Unauthorized => "unauthorized",
            StoreErrorKind::Forbidden => "forbidden",
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::MethodNotFound => "method not found",
            StoreErrorKind::Conflict => "conflict",
            StoreErrorKind::Gone => "gone",
            StoreErrorKind::PreconditionFailed => "precondition failed",
            StoreErrorKind::TooLarge => "content too large",
            StoreErrorKind::UpgradeRequired => "upgrade required",
            StoreErrorKind::TooManyRequests => "too many requests",
            StoreErrorKind::TooManyRequestsAndRetryAfter => "too many requests with retry-after",
            StoreErrorKind::LocalTooManyRequests => "local request budget exhausted",
            StoreErrorKind::RequestFailed => "request failed",
            StoreErrorKind::RequestTimeout => "request timed out",
            StoreErrorKind::RequestProtocolNotSupported => "protocol not supported",
            StoreErrorKind::RequestPathNotEscaped => "request path not escaped",
            StoreErrorKind::RequestHeadersNotObject => "invalid request headers",
            StoreErrorKind::RequestCanceled => "request canceled",
            StoreErrorKind::NoRef => "no ref returned",
            StoreErrorKind::NoCollection => "no collection id returned",
            StoreErrorKind::EmptyResponse => "empty response",
            StoreErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed store operation.
///
/// Carries the classification, the request URL when one was resolved, the
/// HTTP status when a response was received, and the server's operation id
/// when the response named one.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    kind: StoreErrorKind,
    message: String,
    url: Option<String>,
    status: Option<u16>,
    operation_id: Option<String>,
}

impl StoreError {
    /// Creates an error with no associated request.
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        StoreError {
            kind,
            message: message.into(),
            url: None,
            status: None,
            operation_id: None,
        }
    }

    /// Creates an error raised before any request went out.
    pub fn local(kind: StoreErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError {
            kind,
            message: message.into(),
            url: Some(url.into()),
            status: None,
            operation_id: None,
        }
    }

    /// Creates an error classified from a received response.
    pub fn remote(
        kind: StoreErrorKind,
        url: impl Into<String>,
        status: u16,
        operation_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        StoreError {
            kind,
            message: message.into(),
            url: Some(url.into()),
            status: Some(status),
            operation_id,
        }
    }

    /// Returns the error classification.
    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    /// Returns the URL of the failed request, when one was resolved.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Returns the HTTP status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns the server operation id, when the response carried one.
    pub fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_the_message() {
        let err = StoreError::new(StoreErrorKind::Unknown, "something odd");
        assert_eq!(err.to_string(), "something odd");
        assert_eq!(err.kind(), StoreErrorKind::Unknown);
        assert_eq!(err.url(), None);
        assert_eq!(err.status(), None);
    }

    #[test]
    fn remote_errors_keep_request_context() {
        let err = StoreError::remote(
            StoreErrorKind::PreconditionFailed,
            "https://sync.example/v1/resource/settings",
            412,
            Some("77".to_owned()),
            "stale ref",
        );
        assert_eq!(err.kind(), StoreErrorKind::PreconditionFailed);
        assert_eq!(err.status(), Some(412));
        assert_eq!(err.operation_id(), Some("77"));
        assert!(err.url().unwrap().ends_with("/resource/settings"));
    }

    #[test]
    fn kind_names_are_lowercase_words() {
        assert_eq!(StoreErrorKind::NoRef.as_str(), "no ref returned");
        assert_eq!(
            StoreErrorKind::TooManyRequestsAndRetryAfter.to_string(),
            "too many requests with retry-after"
        );
    }
}
