//! # Prefsync Server
//!
//! Reference in-memory settings store server.
//!
//! This crate provides:
//! - The full store protocol: manifest, resources, revisions, collections
//! - ETag-based conditional reads and writes
//! - Admin controls for tests: account wipe and request throttling
//!
//! # Architecture
//!
//! The server holds one account entirely in memory and speaks the protocol
//! over `WireRequest` / `WireResponse` envelopes. It binds no socket; the
//! embedder decides how envelopes travel. Client integration tests hand
//! envelopes over directly, which keeps a full client/server exchange
//! inside one process.
//!
//! # Protocol
//!
//! All routes live under `/v1/`:
//! 1. `GET manifest` advertises the session and latest ref per resource
//! 2. `GET/POST/DELETE resource/{name}[/latest|/{ref}]` read and write
//!    resource versions, guarded by `If-Match` / `If-None-Match`
//! 3. `GET/POST/DELETE collection[/{id}]` manage collection scopes
//! 4. `GET download` exports an activity snapshot of the account

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod handler;
mod server;
mod state;

pub use config::ServerConfig;
pub use server::{SyncStoreServer, ThrottleMode};
