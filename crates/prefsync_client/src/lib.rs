//! # Prefsync Client
//!
//! Client core for a settings synchronization store.
//!
//! This crate provides:
//! - `SyncStoreClient`, the manifest, resource and collection operations
//! - A sliding-window request budget and a persisted server backoff
//! - Session id tracking with drift detection
//! - A closed error taxonomy over local and remote failures
//! - The `Requester` trait embedders implement to supply HTTP transport
//!
//! The client core performs no I/O of its own. Everything it needs from
//! the environment arrives through two seams: a [`Requester`] carries
//! envelopes to the store, and a [`StateStore`](state_store::StateStore)
//! persists the small set of values that survive restarts.
//!
//! ```no_run
//! use prefsync_client::config::StoreClientConfig;
//! use prefsync_client::descriptor::StoreEndpoints;
//! use prefsync_client::requester::MockRequester;
//! use prefsync_client::state_store::MemoryStateStore;
//! use prefsync_client::store::{AuthToken, SyncStoreClient};
//! use prefsync_client::CancellationToken;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), prefsync_client::error::StoreError> {
//! let client = SyncStoreClient::new(
//!     StoreClientConfig::new("example", "1.0.0"),
//!     StoreEndpoints::new("https://sync.example.com"),
//!     Arc::new(MockRequester::new()),
//!     Arc::new(MemoryStateStore::new()),
//! );
//! client.set_auth_token(AuthToken::new("token", "github"));
//! let _manifest = client.manifest(None, &CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
mod classify;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod limiter;
pub mod requester;
pub mod session;
pub mod state_store;
pub mod store;

pub use backoff::BackoffController;
pub use config::StoreClientConfig;
pub use descriptor::{StoreEndpoints, SyncStoreDescriptor, UrlKind};
pub use error::{StoreError, StoreErrorKind, StoreResult};
pub use requester::{RequestFailure, Requester};
pub use state_store::{SharedStateStore, StateStore};
pub use store::{AuthToken, SyncStoreClient, TokenState};

pub use tokio_util::sync::CancellationToken;
