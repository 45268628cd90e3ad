//! # Prefsync Testkit
//!
//! Test utilities for Prefsync.
//!
//! This crate provides:
//! - A loopback requester that hands envelopes to an in-process server
//! - Client/server fixtures with shared state stores
//! - Test logging setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use prefsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn writes_show_up_in_the_manifest() {
//!     let fixture = StoreFixture::new();
//!     // ... drive fixture.client against fixture.server
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod logging;
pub mod requester;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::logging::*;
    pub use crate::requester::*;
}

pub use fixtures::{StoreFixture, FIXTURE_TOKEN, FIXTURE_URL};
pub use logging::init_tracing;
pub use requester::LoopbackRequester;
