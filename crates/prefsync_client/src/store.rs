//! The sync store client.

use crate::backoff::BackoffController;
use crate::classify;
use crate::config::StoreClientConfig;
use crate::descriptor::{StoreEndpoints, StoreSelection, SyncStoreDescriptor, UrlKind};
use crate::error::{StoreError, StoreErrorKind, StoreResult};
use crate::limiter::RequestSession;
use crate::requester::Requester;
use crate::session::SessionTracker;
use crate::state_store::SharedStateStore;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use prefsync_protocol::{
    body_text, headers, media, CollectionInfo, HeaderMap, Manifest, Method, ProtocolError,
    ResourceRef, ResourceRevision, RevisionEntry, UserData, WireRequest, WireResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Longest pause honored from a `Retry-After` header; anything larger is
/// clamped so the deadline arithmetic cannot overflow.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// A bearer credential for the store account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    /// The bearer token value.
    pub token: String,
    /// Type of the account the token belongs to, such as the provider id.
    pub account_type: String,
}

impl AuthToken {
    /// Creates a token.
    pub fn new(token: impl Into<String>, account_type: impl Into<String>) -> Self {
        AuthToken {
            token: token.into(),
            account_type: account_type.into(),
        }
    }
}

/// What the store last said about the installed auth token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No classified response observed yet.
    Unknown,
    /// The last classified response accepted the token.
    Valid,
    /// The store rejected the token.
    Invalid,
}

/// Client for a settings synchronization store.
///
/// One instance serves one account. Every operation resolves the service
/// URL at its start, requires an auth token, honors the server backoff and
/// spends one slot of the local request budget before anything reaches the
/// wire. Responses flow through the classifier, which turns failures into
/// [`StoreError`] values and applies their side effects: clearing a
/// rejected token and arming the backoff on throttling.
///
/// Pointing the client at a different service through
/// [`update_endpoints`](Self::update_endpoints) or
/// [`switch`](Self::switch) keeps the request budget, backoff and session
/// state intact; a new service never grants a fresh budget.
pub struct SyncStoreClient<R> {
    config: StoreClientConfig,
    endpoints: RwLock<StoreEndpoints>,
    selection: StoreSelection,
    session: RequestSession<R>,
    backoff: BackoffController,
    tracker: SessionTracker,
    token: Mutex<Option<AuthToken>>,
    token_state: watch::Sender<TokenState>,
    previous: Option<SyncStoreDescriptor>,
}

impl<R: Requester> SyncStoreClient<R> {
    /// Creates a client.
    ///
    /// Must be called from within a Tokio runtime; the backoff controller
    /// spawns its expiry timer on construction and re-arms any persisted
    /// backoff deadline.
    pub fn new(
        config: StoreClientConfig,
        endpoints: StoreEndpoints,
        requester: R,
        store: SharedStateStore,
    ) -> Self {
        let selection = StoreSelection::new(Arc::clone(&store));
        let previous = selection.previous();
        let session = RequestSession::new(requester, config.request_limit, config.request_interval);
        let backoff = BackoffController::new(Arc::clone(&store));
        let tracker = SessionTracker::new(store);
        let (token_state, _) = watch::channel(TokenState::Unknown);
        let client = SyncStoreClient {
            config,
            endpoints: RwLock::new(endpoints),
            selection,
            session,
            backoff,
            tracker,
            token: Mutex::new(None),
            token_state,
            previous,
        };
        if let Some(descriptor) = client.descriptor() {
            client.selection.remember(&descriptor);
        }
        client
    }

    /// Returns the resolved service descriptor.
    ///
    /// `None` when no URL is configured; every operation then fails with
    /// [`StoreErrorKind::Unknown`].
    pub fn descriptor(&self) -> Option<SyncStoreDescriptor> {
        self.selection.resolve(&self.endpoints.read())
    }

    /// Returns the descriptor resolved by the previous process run.
    pub fn previous_descriptor(&self) -> Option<SyncStoreDescriptor> {
        self.previous.clone()
    }

    /// Replaces the configured endpoints.
    pub fn update_endpoints(&self, endpoints: StoreEndpoints) {
        *self.endpoints.write() = endpoints;
        if let Some(descriptor) = self.descriptor() {
            self.selection.remember(&descriptor);
        }
    }

    /// Switches between the stable and insiders services.
    ///
    /// The choice is persisted and honored across restarts.
    pub fn switch(&self, kind: UrlKind) -> StoreResult<()> {
        let Some(descriptor) = self.descriptor() else {
            return Err(not_configured());
        };
        if !descriptor.can_switch {
            return Err(StoreError::new(
                StoreErrorKind::Unknown,
                "sync store does not support switching services",
            ));
        }
        if descriptor.kind != kind {
            self.selection.record_switch(kind);
            if let Some(descriptor) = self.descriptor() {
                self.selection.remember(&descriptor);
            }
            tracing::info!(service = %kind, "switched sync store service");
        }
        Ok(())
    }

    /// Clears any recorded switch, returning to the default service.
    pub fn reset_to_default(&self) {
        self.selection.reset();
        if let Some(descriptor) = self.descriptor() {
            self.selection.remember(&descriptor);
        }
    }

    /// Installs the bearer token used for subsequent requests.
    pub fn set_auth_token(&self, token: AuthToken) {
        *self.token.lock() = Some(token);
    }

    /// Removes the bearer token. Subsequent operations fail locally with
    /// [`StoreErrorKind::Unauthorized`].
    pub fn clear_auth_token(&self) {
        *self.token.lock() = None;
    }

    /// Observes what the store thinks of the installed token.
    pub fn token_state(&self) -> watch::Receiver<TokenState> {
        self.token_state.subscribe()
    }

    /// Returns the backoff controller, for observing request suspension.
    pub fn backoff(&self) -> &BackoffController {
        &self.backoff
    }

    /// Fetches the account manifest.
    ///
    /// `previous` enables a conditional fetch: on 304 the previous
    /// manifest is returned unchanged. `Ok(None)` means the store holds no
    /// data. A successful fetch also reconciles session state: when the
    /// server session differs from the cached one, or the manifest is
    /// gone while a session is cached, both session ids are purged before
    /// the new session is recorded.
    pub async fn manifest(
        &self,
        previous: Option<&Manifest>,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<Manifest>> {
        let url = self.url_for("manifest")?;
        let mut op_headers = HeaderMap::new();
        if let Some(previous) = previous {
            op_headers.set(headers::IF_NONE_MATCH, previous.reference.as_str());
        }
        let response = self
            .round_trip(Method::Get, &url, op_headers, None, &[304], cancel)
            .await?;

        let manifest = if response.status == 304 {
            previous.cloned()
        } else if response.body.is_empty() {
            None
        } else {
            let reference = response.etag().ok_or_else(|| missing_ref(&url, &response))?;
            let parsed = Manifest::parse(&response.body, reference)
                .map_err(|source| body_error(&url, &response, source))?;
            Some(parsed)
        };

        if let Some(cached) = self.tracker.user_session_id() {
            let drifted = match &manifest {
                Some(manifest) => manifest.session != cached,
                None => true,
            };
            if drifted {
                tracing::warn!("server session changed, purging session state");
                self.tracker.clear();
            }
        }
        if let Some(manifest) = &manifest {
            self.tracker.set_user_session_id(&manifest.session);
        }
        Ok(manifest)
    }

    /// Reads the latest version of a resource.
    ///
    /// Sent with `Cache-Control: no-cache` so intermediaries cannot answer
    /// with a stale latest. `previous` enables a conditional read: on 304
    /// the previous data is returned unchanged. Content is `None` when the
    /// server holds no content for the resource.
    pub async fn read_resource(
        &self,
        resource: &str,
        previous: Option<&UserData>,
        collection: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<UserData> {
        let url = self.url_for(&format!("{}/latest", resource_path(resource, collection)))?;
        let mut op_headers = HeaderMap::new();
        op_headers.set(headers::CACHE_CONTROL, "no-cache");
        if let Some(previous) = previous {
            op_headers.set(headers::IF_NONE_MATCH, previous.reference.as_str());
        }
        let response = self
            .round_trip(Method::Get, &url, op_headers, None, &[304], cancel)
            .await?;

        if response.status == 304 {
            return previous.cloned().ok_or_else(|| {
                remote_error(
                    StoreErrorKind::EmptyResponse,
                    &url,
                    &response,
                    "server answered 304 but no previous content is held",
                )
            });
        }
        let reference = response.etag().ok_or_else(|| missing_ref(&url, &response))?;
        let content = body_text(&response.body, "resource content")
            .map_err(|source| body_error(&url, &response, source))?
            .map(str::to_owned);
        Ok(UserData::new(reference, content))
    }

    /// Writes new content for a resource, returning the ref it was stored
    /// under.
    ///
    /// `expected` guards the write: the server rejects it with
    /// [`StoreErrorKind::PreconditionFailed`] unless that ref is still the
    /// latest.
    pub async fn write_resource(
        &self,
        resource: &str,
        content: &str,
        expected: Option<&ResourceRef>,
        collection: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<ResourceRef> {
        let url = self.url_for(&resource_path(resource, collection))?;
        let mut op_headers = HeaderMap::new();
        op_headers.set(headers::CONTENT_TYPE, media::TEXT);
        if let Some(expected) = expected {
            op_headers.set(headers::IF_MATCH, expected.as_str());
        }
        let body = Bytes::from(content.to_owned());
        let response = self
            .round_trip(Method::Post, &url, op_headers, Some(body), &[], cancel)
            .await?;
        response.etag().ok_or_else(|| missing_ref(&url, &response))
    }

    /// Lists every stored revision of a resource, in server order.
    pub async fn all_resource_revisions(
        &self,
        resource: &str,
        collection: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<ResourceRevision>> {
        let url = self.url_for(&resource_path(resource, collection))?;
        let response = self
            .round_trip(Method::Get, &url, HeaderMap::new(), None, &[], cancel)
            .await?;
        let entries = RevisionEntry::parse_list(&response.body)
            .map_err(|source| body_error(&url, &response, source))?;
        Ok(entries.into_iter().map(ResourceRevision::from).collect())
    }

    /// Fetches the content stored at a specific revision.
    ///
    /// Sent with `Cache-Control: no-cache` so intermediaries cannot serve
    /// a cached copy of an immutable version. `None` means the revision
    /// holds no content.
    pub async fn resolve_resource_content(
        &self,
        resource: &str,
        reference: &ResourceRef,
        collection: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<String>> {
        let url = self.url_for(&format!(
            "{}/{reference}",
            resource_path(resource, collection)
        ))?;
        let mut op_headers = HeaderMap::new();
        op_headers.set(headers::CACHE_CONTROL, "no-cache");
        let response = self
            .round_trip(Method::Get, &url, op_headers, None, &[], cancel)
            .await?;
        let content = body_text(&response.body, "resource content")
            .map_err(|source| body_error(&url, &response, source))?
            .map(str::to_owned);
        Ok(content)
    }

    /// Deletes one revision of a resource, or every revision when
    /// `reference` is `None`.
    pub async fn delete_resource(
        &self,
        resource: &str,
        reference: Option<&ResourceRef>,
        collection: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        let path = match reference {
            Some(reference) => format!("{}/{reference}", resource_path(resource, collection)),
            None => resource_path(resource, collection),
        };
        let url = self.url_for(&path)?;
        self.round_trip(Method::Delete, &url, HeaderMap::new(), None, &[], cancel)
            .await?;
        Ok(())
    }

    /// Deletes every resource stored for the account, across collections.
    pub async fn delete_all_resources(&self, cancel: &CancellationToken) -> StoreResult<()> {
        let url = self.url_for("resource")?;
        self.round_trip(Method::Delete, &url, HeaderMap::new(), None, &[], cancel)
            .await?;
        Ok(())
    }

    /// Lists the account's collections.
    pub async fn all_collections(
        &self,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<CollectionInfo>> {
        let url = self.url_for("collection")?;
        let response = self
            .round_trip(Method::Get, &url, HeaderMap::new(), None, &[], cancel)
            .await?;
        CollectionInfo::parse_list(&response.body)
            .map_err(|source| body_error(&url, &response, source))
    }

    /// Creates a collection and returns its server-assigned id.
    pub async fn create_collection(&self, cancel: &CancellationToken) -> StoreResult<String> {
        let url = self.url_for("collection")?;
        let response = self
            .round_trip(Method::Post, &url, HeaderMap::new(), None, &[], cancel)
            .await?;
        let id = body_text(&response.body, "collection id")
            .map_err(|source| body_error(&url, &response, source))?;
        match id {
            Some(id) => Ok(id.to_owned()),
            None => Err(remote_error(
                StoreErrorKind::NoCollection,
                &url,
                &response,
                "server did not return a collection id",
            )),
        }
    }

    /// Deletes one collection, or every collection when `collection` is
    /// `None`.
    pub async fn delete_collection(
        &self,
        collection: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        let path = match collection {
            Some(id) => format!("collection/{id}"),
            None => "collection".to_owned(),
        };
        let url = self.url_for(&path)?;
        self.round_trip(Method::Delete, &url, HeaderMap::new(), None, &[], cancel)
            .await?;
        Ok(())
    }

    /// Deletes all server-side data for the account and purges local
    /// session state.
    pub async fn clear(&self, cancel: &CancellationToken) -> StoreResult<()> {
        self.delete_collection(None, cancel).await?;
        self.delete_all_resources(cancel).await?;
        self.tracker.clear();
        Ok(())
    }

    /// Downloads the server's activity record for the account.
    pub async fn activity_data(&self, cancel: &CancellationToken) -> StoreResult<Bytes> {
        let url = self.url_for("download")?;
        let response = self
            .round_trip(Method::Get, &url, HeaderMap::new(), None, &[], cancel)
            .await?;
        if response.body.is_empty() {
            return Err(remote_error(
                StoreErrorKind::EmptyResponse,
                &url,
                &response,
                "server returned no activity data",
            ));
        }
        Ok(response.body)
    }

    /// Resolves the absolute URL for a path under the service root.
    ///
    /// Resolution happens once per operation; a concurrent endpoint change
    /// affects only later operations.
    fn url_for(&self, path: &str) -> StoreResult<String> {
        let descriptor = self.descriptor().ok_or_else(not_configured)?;
        Ok(format!(
            "{}/v1/{path}",
            descriptor.url.trim_end_matches('/')
        ))
    }

    /// Runs the precondition chain and one classified exchange.
    async fn round_trip(
        &self,
        method: Method,
        url: &str,
        op_headers: HeaderMap,
        body: Option<Bytes>,
        acceptable: &[u16],
        cancel: &CancellationToken,
    ) -> StoreResult<WireResponse> {
        let token = self.token.lock().clone();
        let Some(token) = token else {
            return Err(StoreError::local(
                StoreErrorKind::Unauthorized,
                url,
                "no authentication token is available",
            ));
        };
        if let Some(remaining) = self.backoff.remaining() {
            return Err(StoreError::local(
                StoreErrorKind::TooManyRequestsAndRetryAfter,
                url,
                format!(
                    "requests are suspended for another {}s by server backoff",
                    remaining.as_secs()
                ),
            ));
        }

        let mut request = WireRequest::new(method, url);
        request
            .headers
            .set(headers::CLIENT_NAME, self.config.client_name.as_str());
        request
            .headers
            .set(headers::CLIENT_VERSION, self.config.client_version.as_str());
        if let Some(commit) = &self.config.client_commit {
            request.headers.set(headers::CLIENT_COMMIT, commit.as_str());
        }
        request
            .headers
            .set(headers::ACCOUNT_TYPE, token.account_type.as_str());
        request
            .headers
            .set(headers::AUTHORIZATION, format!("Bearer {}", token.token));
        self.tracker.apply(&mut request.headers);
        request
            .headers
            .set(headers::EXECUTION_ID, Uuid::new_v4().to_string());
        for (name, value) in op_headers.iter() {
            request.headers.set(name, value);
        }
        if let Some(body) = body {
            request.body = body;
        }

        tracing::debug!(method = %method, url = %url, "sync store request");
        let response = self.session.request(request, cancel).await?;
        self.check(url, &response, acceptable)?;
        Ok(response)
    }

    /// Classifies a response, applying token and backoff side effects.
    fn check(&self, url: &str, response: &WireResponse, acceptable: &[u16]) -> StoreResult<()> {
        if response.is_success() || acceptable.contains(&response.status) {
            self.token_state.send_replace(TokenState::Valid);
            return Ok(());
        }
        let kind = classify::status_kind(response.status, response.retry_after_secs().is_some());
        match kind {
            StoreErrorKind::Unauthorized | StoreErrorKind::Forbidden => {
                tracing::warn!(url = %url, status = response.status, "sync store rejected the auth token");
                self.clear_auth_token();
                self.token_state.send_replace(TokenState::Invalid);
            }
            StoreErrorKind::TooManyRequestsAndRetryAfter => {
                self.token_state.send_replace(TokenState::Valid);
                if let Some(secs) = response.retry_after_secs() {
                    let pause = Duration::from_secs(secs).min(MAX_RETRY_AFTER);
                    self.backoff.set_deadline(Some(Instant::now() + pause));
                }
            }
            _ => {
                self.token_state.send_replace(TokenState::Valid);
            }
        }
        Err(classify::response_error(url, response, kind))
    }
}

/// Builds the path for a resource, scoped to a collection when given.
fn resource_path(resource: &str, collection: Option<&str>) -> String {
    match collection {
        Some(collection) => format!("collection/{collection}/resource/{resource}"),
        None => format!("resource/{resource}"),
    }
}

fn not_configured() -> StoreError {
    StoreError::new(StoreErrorKind::Unknown, "sync store is not configured")
}

fn remote_error(
    kind: StoreErrorKind,
    url: &str,
    response: &WireResponse,
    message: &str,
) -> StoreError {
    StoreError::remote(
        kind,
        url,
        response.status,
        response.operation_id().map(str::to_owned),
        message,
    )
}

fn missing_ref(url: &str, response: &WireResponse) -> StoreError {
    remote_error(
        StoreErrorKind::NoRef,
        url,
        response,
        "server did not return a ref",
    )
}

fn body_error(url: &str, response: &WireResponse, source: ProtocolError) -> StoreError {
    remote_error(
        StoreErrorKind::Unknown,
        url,
        response,
        &format!("unreadable response body: {source}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requester::MockRequester;
    use crate::state_store::MemoryStateStore;

    fn test_client(mock: Arc<MockRequester>) -> SyncStoreClient<Arc<MockRequester>> {
        let client = SyncStoreClient::new(
            StoreClientConfig::new("tester", "0.0.1"),
            StoreEndpoints::new("https://sync.example"),
            mock,
            Arc::new(MemoryStateStore::new()),
        );
        client.set_auth_token(AuthToken::new("secret", "github"));
        client
    }

    fn manifest_response(session: &str, reference: &str) -> WireResponse {
        WireResponse::new(200)
            .with_header(headers::ETAG, reference)
            .with_header("content-type", media::JSON)
            .with_body(format!("{{\"session\":\"{session}\",\"latest\":{{}}}}"))
    }

    #[tokio::test]
    async fn unconfigured_store_refuses_operations() {
        let mock = Arc::new(MockRequester::new());
        let client = SyncStoreClient::new(
            StoreClientConfig::default(),
            StoreEndpoints::default(),
            Arc::clone(&mock),
            Arc::new(MemoryStateStore::new()),
        );
        client.set_auth_token(AuthToken::new("secret", "github"));

        let err = client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Unknown);
        assert!(client.descriptor().is_none());
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn missing_token_fails_locally() {
        let mock = Arc::new(MockRequester::new());
        let client = SyncStoreClient::new(
            StoreClientConfig::default(),
            StoreEndpoints::new("https://sync.example"),
            Arc::clone(&mock),
            Arc::new(MemoryStateStore::new()),
        );

        let err = client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Unauthorized);
        assert_eq!(err.url(), Some("https://sync.example/v1/manifest"));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn write_sends_conditional_and_identity_headers() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(WireResponse::new(200).with_header(headers::ETAG, "8"));
        let client = test_client(Arc::clone(&mock));

        let reference = client
            .write_resource(
                "settings",
                "{\"theme\":\"dark\"}",
                Some(&ResourceRef::new("7")),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(reference, ResourceRef::new("8"));

        let request = &mock.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "https://sync.example/v1/resource/settings");
        assert_eq!(request.headers.get(headers::IF_MATCH), Some("7"));
        assert_eq!(request.headers.get(headers::CONTENT_TYPE), Some(media::TEXT));
        assert_eq!(
            request.headers.get(headers::AUTHORIZATION),
            Some("Bearer secret")
        );
        assert_eq!(request.headers.get(headers::ACCOUNT_TYPE), Some("github"));
        assert_eq!(request.headers.get(headers::CLIENT_NAME), Some("tester"));
        assert_eq!(request.headers.get(headers::CLIENT_VERSION), Some("0.0.1"));
        assert!(request.headers.contains(headers::MACHINE_SESSION_ID));
        assert!(request.headers.contains(headers::EXECUTION_ID));
        assert_eq!(&request.body[..], b"{\"theme\":\"dark\"}");
    }

    #[tokio::test]
    async fn read_sends_cache_and_conditional_headers() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(
            WireResponse::new(200)
                .with_header(headers::ETAG, "6")
                .with_body("new"),
        );
        let client = test_client(Arc::clone(&mock));

        let previous = UserData::new(ResourceRef::new("5"), Some("old".to_owned()));
        let data = client
            .read_resource("settings", Some(&previous), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(data, UserData::new(ResourceRef::new("6"), Some("new".to_owned())));

        let request = &mock.requests()[0];
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.url, "https://sync.example/v1/resource/settings/latest");
        assert_eq!(request.headers.get(headers::CACHE_CONTROL), Some("no-cache"));
        assert_eq!(request.headers.get(headers::IF_NONE_MATCH), Some("5"));
    }

    #[tokio::test]
    async fn write_without_etag_fails_with_no_ref() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(WireResponse::new(200));
        let client = test_client(mock);

        let err = client
            .write_resource("settings", "x", None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::NoRef);
        assert_eq!(err.status(), Some(200));
    }

    #[tokio::test]
    async fn unauthorized_clears_the_token() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(WireResponse::new(401));
        let client = test_client(Arc::clone(&mock));
        let token_state = client.token_state();
        assert_eq!(*token_state.borrow(), TokenState::Unknown);

        let err = client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Unauthorized);
        assert_eq!(*token_state.borrow(), TokenState::Invalid);

        // The token is gone, so the next operation fails before the wire.
        let err = client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Unauthorized);
        assert_eq!(err.status(), None);
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn forbidden_clears_the_token_too() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(WireResponse::new(403));
        let client = test_client(Arc::clone(&mock));
        let token_state = client.token_state();

        let err = client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Forbidden);
        assert_eq!(*token_state.borrow(), TokenState::Invalid);

        let err = client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Unauthorized);
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_arms_the_backoff() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(
            WireResponse::new(429).with_header(headers::RETRY_AFTER, "300"),
        );
        let client = test_client(Arc::clone(&mock));

        let err = client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::TooManyRequestsAndRetryAfter);
        assert!(client.backoff().is_active());

        let err = client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::TooManyRequestsAndRetryAfter);
        assert_eq!(err.status(), None, "second failure must be local");
        assert_eq!(mock.request_count(), 1);

        tokio::time::sleep(Duration::from_secs(301)).await;
        mock.push_response(manifest_response("s-1", "1"));
        client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_retry_after_is_capped() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(
            WireResponse::new(429).with_header(headers::RETRY_AFTER, u64::MAX.to_string()),
        );
        let client = test_client(Arc::clone(&mock));

        let err = client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::TooManyRequestsAndRetryAfter);
        assert!(client.backoff().is_active());

        let err = client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::TooManyRequestsAndRetryAfter);
        assert_eq!(err.status(), None, "second failure must be local");
        assert_eq!(mock.request_count(), 1);

        // The capped pause still clears like any other deadline.
        tokio::time::sleep(MAX_RETRY_AFTER + Duration::from_secs(1)).await;
        mock.push_response(manifest_response("s-1", "1"));
        client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn throttling_without_retry_after_stays_unarmed() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(WireResponse::new(429));
        mock.push_response(manifest_response("s-1", "1"));
        let client = test_client(Arc::clone(&mock));

        let err = client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::TooManyRequests);
        assert!(!client.backoff().is_active());

        client
            .manifest(None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn conditional_read_returns_previous_on_304() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(WireResponse::new(304).with_header(headers::ETAG, "5"));
        let client = test_client(Arc::clone(&mock));

        let previous = UserData::new(ResourceRef::new("5"), Some("old".to_owned()));
        let data = client
            .read_resource("settings", Some(&previous), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(data, previous);
        assert_eq!(
            mock.requests()[0].headers.get(headers::IF_NONE_MATCH),
            Some("5")
        );
    }

    #[tokio::test]
    async fn unexpected_304_without_previous_is_an_empty_response() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(WireResponse::new(304));
        let client = test_client(mock);

        let err = client
            .read_resource("settings", None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::EmptyResponse);
    }

    #[tokio::test]
    async fn empty_read_yields_sentinel_ref_and_no_content() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(WireResponse::new(204).with_header(headers::ETAG, "0"));
        let client = test_client(mock);

        let data = client
            .read_resource("settings", None, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(data.reference, ResourceRef::new("0"));
        assert_eq!(data.content, None);
    }

    #[tokio::test]
    async fn manifest_session_drift_purges_session_state() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(manifest_response("s-1", "1"));
        mock.push_response(manifest_response("s-2", "2"));
        mock.push_response(manifest_response("s-2", "2"));
        let client = test_client(Arc::clone(&mock));
        let cancel = CancellationToken::new();

        client.manifest(None, &cancel).await.unwrap();
        client.manifest(None, &cancel).await.unwrap();
        client.manifest(None, &cancel).await.unwrap();

        let requests = mock.requests();
        let first_machine = requests[0]
            .headers
            .get(headers::MACHINE_SESSION_ID)
            .unwrap()
            .to_owned();
        // Second request still rides the first machine id and echoes s-1.
        assert_eq!(
            requests[1].headers.get(headers::MACHINE_SESSION_ID),
            Some(first_machine.as_str())
        );
        assert_eq!(requests[1].headers.get(headers::USER_SESSION_ID), Some("s-1"));
        // The drift observed in the second response forces fresh ids.
        assert_ne!(
            requests[2].headers.get(headers::MACHINE_SESSION_ID),
            Some(first_machine.as_str())
        );
        assert_eq!(requests[2].headers.get(headers::USER_SESSION_ID), Some("s-2"));
    }

    #[tokio::test]
    async fn absent_manifest_with_cached_session_purges_session_state() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(manifest_response("s-1", "1"));
        mock.push_response(WireResponse::new(204));
        mock.push_response(manifest_response("s-1", "1"));
        let client = test_client(Arc::clone(&mock));
        let cancel = CancellationToken::new();

        client.manifest(None, &cancel).await.unwrap();
        let absent = client.manifest(None, &cancel).await.unwrap();
        assert_eq!(absent, None);
        client.manifest(None, &cancel).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests[1].headers.get(headers::USER_SESSION_ID), Some("s-1"));
        assert_eq!(requests[2].headers.get(headers::USER_SESSION_ID), None);
        assert_ne!(
            requests[2].headers.get(headers::MACHINE_SESSION_ID),
            requests[0].headers.get(headers::MACHINE_SESSION_ID)
        );
    }

    #[tokio::test]
    async fn canceled_operations_never_reach_the_requester() {
        let mock = Arc::new(MockRequester::new());
        let client = test_client(Arc::clone(&mock));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client.manifest(None, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::RequestCanceled);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn create_collection_requires_an_id_in_the_body() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(WireResponse::new(200));
        mock.push_response(WireResponse::new(200).with_body(&b"11"[..]));
        let client = test_client(mock);
        let cancel = CancellationToken::new();

        let err = client.create_collection(&cancel).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::NoCollection);

        let id = client.create_collection(&cancel).await.unwrap();
        assert_eq!(id, "11");
    }

    #[tokio::test]
    async fn activity_data_requires_a_body() {
        let mock = Arc::new(MockRequester::new());
        mock.push_response(WireResponse::new(200));
        mock.push_response(WireResponse::new(200).with_body(&b"{\"log\":[]}"[..]));
        let client = test_client(mock);
        let cancel = CancellationToken::new();

        let err = client.activity_data(&cancel).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::EmptyResponse);

        let data = client.activity_data(&cancel).await.unwrap();
        assert_eq!(&data[..], b"{\"log\":[]}");
    }

    #[tokio::test]
    async fn switching_requires_permission_and_persists() {
        let mock = Arc::new(MockRequester::new());
        let store: SharedStateStore = Arc::new(MemoryStateStore::new());
        let fixed = SyncStoreClient::new(
            StoreClientConfig::default(),
            StoreEndpoints::new("https://sync.example"),
            Arc::clone(&mock),
            Arc::clone(&store),
        );
        let err = fixed.switch(UrlKind::Insiders).unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Unknown);
        drop(fixed);

        let endpoints = StoreEndpoints::new("https://sync.example")
            .with_insiders_url("https://insiders.example")
            .with_switching();
        let client = SyncStoreClient::new(
            StoreClientConfig::default(),
            endpoints.clone(),
            Arc::clone(&mock),
            Arc::clone(&store),
        );
        client.switch(UrlKind::Insiders).unwrap();
        assert_eq!(
            client.descriptor().unwrap().url,
            "https://insiders.example"
        );

        // A new client over the same state keeps the switched service and
        // reports the snapshot the previous resolution recorded.
        let reopened = SyncStoreClient::new(
            StoreClientConfig::default(),
            endpoints,
            mock,
            store,
        );
        assert_eq!(
            reopened.descriptor().unwrap().url,
            "https://insiders.example"
        );
        assert_eq!(
            reopened.previous_descriptor().unwrap().url,
            "https://insiders.example"
        );

        reopened.reset_to_default();
        assert_eq!(reopened.descriptor().unwrap().url, "https://sync.example");
    }
}
