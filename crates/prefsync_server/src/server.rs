//! The reference store server.

use crate::config::ServerConfig;
use crate::handler;
use crate::state::StoreState;
use parking_lot::Mutex;
use prefsync_protocol::{headers, media, WireRequest, WireResponse};
use std::sync::atomic::{AtomicU64, Ordering};

/// Throttling behavior switched on by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleMode {
    /// Answer 429 with a `Retry-After` header carrying this many seconds.
    RetryAfter(u64),
    /// Answer 429 without a `Retry-After` header.
    Silent,
}

/// An in-memory settings store server.
///
/// The server speaks the store protocol over [`WireRequest`] and
/// [`WireResponse`] envelopes; embedders decide how envelopes travel. One
/// instance holds one account. Admin methods let tests wipe the account or
/// throttle requests without going through the protocol.
///
/// # Example
///
/// ```
/// use prefsync_server::{ServerConfig, SyncStoreServer};
/// use prefsync_protocol::{Method, WireRequest};
///
/// let server = SyncStoreServer::new(ServerConfig::default());
/// let request = WireRequest::new(Method::Get, "https://sync.test/v1/manifest");
/// let response = server.handle(request);
/// assert_eq!(response.status, 204);
/// ```
pub struct SyncStoreServer {
    config: ServerConfig,
    state: Mutex<StoreState>,
    throttle: Mutex<Option<ThrottleMode>>,
    requests: AtomicU64,
}

impl SyncStoreServer {
    /// Creates a server with an empty account.
    pub fn new(config: ServerConfig) -> Self {
        SyncStoreServer {
            config,
            state: Mutex::new(StoreState::new()),
            throttle: Mutex::new(None),
            requests: AtomicU64::new(0),
        }
    }

    /// Handles one request.
    ///
    /// Every response carries an ordinal operation id and echoes the
    /// request's execution id when one was sent.
    pub fn handle(&self, request: WireRequest) -> WireResponse {
        let ordinal = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        let mut response = self.dispatch(&request);
        response
            .headers
            .set(headers::OPERATION_ID, ordinal.to_string());
        if let Some(execution) = request.headers.get(headers::EXECUTION_ID) {
            response.headers.set(headers::EXECUTION_ID, execution);
        }
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = response.status,
            "handled store request"
        );
        response
    }

    fn dispatch(&self, request: &WireRequest) -> WireResponse {
        if let Some(mode) = *self.throttle.lock() {
            return match mode {
                ThrottleMode::RetryAfter(secs) => WireResponse::new(429)
                    .with_header(headers::RETRY_AFTER, secs.to_string()),
                ThrottleMode::Silent => WireResponse::new(429),
            };
        }
        if let Some(expected) = &self.config.expected_token {
            let authorized = request
                .headers
                .get(headers::AUTHORIZATION)
                .and_then(|value| value.strip_prefix("Bearer "))
                .is_some_and(|token| token == expected.as_str());
            if !authorized {
                return WireResponse::new(401);
            }
        }
        let Some(at) = request.url.find("/v1/") else {
            return WireResponse::new(404)
                .with_header(headers::CONTENT_TYPE, media::TEXT)
                .with_body(format!("no service route in {}", request.url));
        };
        let path = &request.url[at + 4..];
        let mut state = self.state.lock();
        handler::respond(&mut state, request, path)
    }

    /// Number of requests handled so far, throttled and rejected ones
    /// included.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Current server session id, `None` while the account holds no data.
    pub fn session(&self) -> Option<String> {
        self.state.lock().session().map(str::to_owned)
    }

    /// Wipes all account data, as a server-side reset would.
    pub fn wipe(&self) {
        self.state.lock().wipe();
    }

    /// Makes the server throttle every request until cleared.
    pub fn throttle(&self, mode: ThrottleMode) {
        *self.throttle.lock() = Some(mode);
    }

    /// Stops throttling.
    pub fn clear_throttle(&self) {
        *self.throttle.lock() = None;
    }
}
