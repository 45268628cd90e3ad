//! Error types for protocol documents.

use thiserror::Error;

/// Result type for protocol parsing.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while reading wire documents.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A JSON document failed to parse.
    #[error("invalid {context} document: {source}")]
    Document {
        /// Which document was being parsed.
        context: &'static str,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A body that should contain UTF-8 text did not.
    #[error("{context} body is not valid UTF-8")]
    NotText {
        /// Which body was being read.
        context: &'static str,
    },
}

impl ProtocolError {
    /// Wraps a JSON error with the kind of document being parsed.
    pub fn document(context: &'static str, source: serde_json::Error) -> Self {
        ProtocolError::Document { context, source }
    }
}
