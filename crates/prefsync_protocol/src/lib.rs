//! # Prefsync Protocol
//!
//! Wire types for the Prefsync settings store protocol.
//!
//! This crate provides:
//! - `WireRequest` / `WireResponse` envelopes exchanged with a requester
//! - `Manifest`, `UserData` and listing documents
//! - `ResourceRef` version tokens
//! - Header and media type names
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod document;
pub mod envelope;
pub mod error;
pub mod refs;

pub use document::{CollectionInfo, Manifest, ResourceRevision, RevisionEntry, UserData};
pub use envelope::{body_text, headers, media, HeaderMap, Method, WireRequest, WireResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use refs::ResourceRef;
