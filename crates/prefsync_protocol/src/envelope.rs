//! Request and response envelopes.
//!
//! The client core never speaks to a socket directly. It builds
//! [`WireRequest`] values and hands them to an embedder-supplied requester,
//! which answers with [`WireResponse`] values. Both sides of that exchange
//! live here so clients, servers and test doubles share one vocabulary.

use crate::error::{ProtocolError, ProtocolResult};
use crate::refs::ResourceRef;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;

/// Well-known header names, stored lowercase.
pub mod headers {
    /// Media type of the request or response body.
    pub const CONTENT_TYPE: &str = "content-type";
    /// Version token attached to a response.
    pub const ETAG: &str = "etag";
    /// Conditional write guard: the expected current ref.
    pub const IF_MATCH: &str = "if-match";
    /// Conditional read guard: the last ref the caller has seen.
    pub const IF_NONE_MATCH: &str = "if-none-match";
    /// Cache directive, sent as `no-cache` on resource reads.
    pub const CACHE_CONTROL: &str = "cache-control";
    /// Server throttle hint in whole seconds.
    pub const RETRY_AFTER: &str = "retry-after";
    /// Bearer credential for the store account.
    pub const AUTHORIZATION: &str = "authorization";
    /// Name of the embedding client application.
    pub const CLIENT_NAME: &str = "x-client-name";
    /// Version of the embedding client application.
    pub const CLIENT_VERSION: &str = "x-client-version";
    /// Build commit of the embedding client application.
    pub const CLIENT_COMMIT: &str = "x-client-commit";
    /// Type of the authentication token, such as the provider id.
    pub const ACCOUNT_TYPE: &str = "x-account-type";
    /// Stable identifier for this installation, minted client-side.
    pub const MACHINE_SESSION_ID: &str = "x-machine-session-id";
    /// Server session the client believes it is talking to.
    pub const USER_SESSION_ID: &str = "x-user-session-id";
    /// Fresh identifier minted per request for tracing.
    pub const EXECUTION_ID: &str = "x-execution-id";
    /// Server-side correlation id attached to a response.
    pub const OPERATION_ID: &str = "x-operation-id";
}

/// Media types used by the protocol.
pub mod media {
    /// JSON documents: manifests and listings.
    pub const JSON: &str = "application/json";
    /// Plain text: resource content payloads.
    pub const TEXT: &str = "text/plain";
    /// Opaque bytes: activity downloads.
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// HTTP method of a wire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read a document or listing.
    Get,
    /// Write content or create a collection.
    Post,
    /// Remove content, one version or in bulk.
    Delete,
}

impl Method {
    /// Returns the method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A case-insensitive header collection.
///
/// Names are folded to lowercase on every access, matching how HTTP treats
/// header names. Iteration order is the sorted lowercase name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: BTreeMap<String, String>,
}

impl HeaderMap {
    /// Creates an empty header map.
    pub fn new() -> Self {
        HeaderMap {
            entries: BTreeMap::new(),
        }
    }

    /// Sets a header, replacing any previous value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Returns the value of a header, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Removes a header, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(&name.to_ascii_lowercase())
    }

    /// Returns whether a header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, value)` pairs in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// One request handed to the requester.
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body, empty for body-less requests.
    pub body: Bytes,
}

impl WireRequest {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        WireRequest {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// One response returned by the requester.
#[derive(Debug, Clone)]
pub struct WireResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body, possibly empty.
    pub body: Bytes,
}

impl WireResponse {
    /// Creates a response with no headers and an empty body.
    pub fn new(status: u16) -> Self {
        WireResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the version token carried by the `ETag` header.
    ///
    /// An empty `ETag` counts as absent.
    pub fn etag(&self) -> Option<ResourceRef> {
        self.headers
            .get(headers::ETAG)
            .filter(|value| !value.is_empty())
            .map(ResourceRef::from)
    }

    /// Returns the server correlation id, if the response carries one.
    pub fn operation_id(&self) -> Option<&str> {
        self.headers.get(headers::OPERATION_ID)
    }

    /// Returns the `Retry-After` delay in seconds.
    ///
    /// A header that does not parse as whole seconds counts as absent.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.headers
            .get(headers::RETRY_AFTER)?
            .trim()
            .parse()
            .ok()
    }
}

/// Reads an envelope body as text.
///
/// Returns `None` for an empty body, and an error when the bytes are not
/// valid UTF-8.
pub fn body_text<'a>(body: &'a [u8], context: &'static str) -> ProtocolResult<Option<&'a str>> {
    if body.is_empty() {
        return Ok(None);
    }
    std::str::from_utf8(body)
        .map(Some)
        .map_err(|_| ProtocolError::NotText { context })
}
