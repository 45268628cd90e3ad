//! Version references.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque version token for stored content.
///
/// Refs are issued by the server, travel in the `ETag` response header and
/// are echoed back through `If-Match` / `If-None-Match` request headers.
/// Clients must treat them as opaque: refs carry no ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRef(String);

impl ResourceRef {
    /// Creates a ref from a server-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        ResourceRef(token.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the ref and returns the underlying token.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ResourceRef {
    fn from(token: String) -> Self {
        ResourceRef(token)
    }
}

impl From<&str> for ResourceRef {
    fn from(token: &str) -> Self {
        ResourceRef(token.to_owned())
    }
}

impl AsRef<str> for ResourceRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
