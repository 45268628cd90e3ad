//! Response and failure classification.
//!
//! The mapping functions here are pure; the side effects classification
//! triggers (token clearing, backoff arming) live on the client.

use crate::error::{StoreError, StoreErrorKind};
use crate::requester::{FailureKind, RequestFailure};
use prefsync_protocol::{body_text, WireResponse};

/// Maps a transport failure to its typed error.
pub(crate) fn failure_error(url: &str, failure: &RequestFailure) -> StoreError {
    let kind = match failure.kind {
        FailureKind::Timeout => StoreErrorKind::RequestTimeout,
        FailureKind::ProtocolNotSupported => StoreErrorKind::RequestProtocolNotSupported,
        FailureKind::PathNotEscaped => StoreErrorKind::RequestPathNotEscaped,
        FailureKind::HeadersNotObject => StoreErrorKind::RequestHeadersNotObject,
        FailureKind::Canceled => StoreErrorKind::RequestCanceled,
        FailureKind::Failed => StoreErrorKind::RequestFailed,
    };
    StoreError::local(kind, url, format!("request to {url} failed: {failure}"))
}

/// Maps a response status outside the acceptable set to an error kind.
///
/// 429 splits on whether the response carried a usable `Retry-After`;
/// a header that does not parse as whole seconds counts as absent.
pub(crate) fn status_kind(status: u16, has_retry_after: bool) -> StoreErrorKind {
    match status {
        401 => StoreErrorKind::Unauthorized,
        403 => StoreErrorKind::Forbidden,
        404 => StoreErrorKind::NotFound,
        405 => StoreErrorKind::MethodNotFound,
        409 => StoreErrorKind::Conflict,
        410 => StoreErrorKind::Gone,
        412 => StoreErrorKind::PreconditionFailed,
        413 => StoreErrorKind::TooLarge,
        426 => StoreErrorKind::UpgradeRequired,
        429 if has_retry_after => StoreErrorKind::TooManyRequestsAndRetryAfter,
        429 => StoreErrorKind::TooManyRequests,
        _ => StoreErrorKind::Unknown,
    }
}

/// Builds the typed error for a response that failed classification.
///
/// For 405 the response body names the rejected method and path, so it is
/// folded into the message.
pub(crate) fn response_error(
    url: &str,
    response: &WireResponse,
    kind: StoreErrorKind,
) -> StoreError {
    let mut message = format!("server answered {} ({kind})", response.status);
    if kind == StoreErrorKind::MethodNotFound {
        if let Ok(Some(text)) = body_text(&response.body, "error") {
            message.push_str(": ");
            message.push_str(text);
        }
    }
    StoreError::remote(
        kind,
        url,
        response.status,
        response.operation_id().map(str::to_owned),
        message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefsync_protocol::headers;

    #[test]
    fn every_mapped_status_has_its_kind() {
        let table = [
            (401, StoreErrorKind::Unauthorized),
            (403, StoreErrorKind::Forbidden),
            (404, StoreErrorKind::NotFound),
            (405, StoreErrorKind::MethodNotFound),
            (409, StoreErrorKind::Conflict),
            (410, StoreErrorKind::Gone),
            (412, StoreErrorKind::PreconditionFailed),
            (413, StoreErrorKind::TooLarge),
            (426, StoreErrorKind::UpgradeRequired),
        ];
        for (status, kind) in table {
            assert_eq!(status_kind(status, false), kind, "status {status}");
            assert_eq!(status_kind(status, true), kind, "status {status}");
        }
    }

    #[test]
    fn throttling_splits_on_retry_after() {
        assert_eq!(status_kind(429, true), StoreErrorKind::TooManyRequestsAndRetryAfter);
        assert_eq!(status_kind(429, false), StoreErrorKind::TooManyRequests);
    }

    #[test]
    fn unmapped_statuses_fall_back_to_unknown() {
        assert_eq!(status_kind(418, false), StoreErrorKind::Unknown);
        assert_eq!(status_kind(500, false), StoreErrorKind::Unknown);
        assert_eq!(status_kind(503, true), StoreErrorKind::Unknown);
    }

    #[test]
    fn transport_failures_map_onto_request_kinds() {
        let cases = [
            (FailureKind::Timeout, StoreErrorKind::RequestTimeout),
            (
                FailureKind::ProtocolNotSupported,
                StoreErrorKind::RequestProtocolNotSupported,
            ),
            (FailureKind::PathNotEscaped, StoreErrorKind::RequestPathNotEscaped),
            (FailureKind::HeadersNotObject, StoreErrorKind::RequestHeadersNotObject),
            (FailureKind::Canceled, StoreErrorKind::RequestCanceled),
            (FailureKind::Failed, StoreErrorKind::RequestFailed),
        ];
        for (failure_kind, error_kind) in cases {
            let failure = RequestFailure::new(failure_kind, "boom");
            let err = failure_error("https://sync.example/v1/manifest", &failure);
            assert_eq!(err.kind(), error_kind);
            assert_eq!(err.url(), Some("https://sync.example/v1/manifest"));
            assert_eq!(err.status(), None);
        }
    }

    #[test]
    fn method_not_found_includes_the_body() {
        let response = WireResponse::new(405)
            .with_header(headers::OPERATION_ID, "12")
            .with_body(&b"PATCH is not supported for /v1/manifest"[..]);
        let err = response_error(
            "https://sync.example/v1/manifest",
            &response,
            StoreErrorKind::MethodNotFound,
        );
        assert!(err.to_string().contains("PATCH is not supported"));
        assert_eq!(err.operation_id(), Some("12"));
        assert_eq!(err.status(), Some(405));
    }
}
