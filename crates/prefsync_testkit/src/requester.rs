//! In-process transport over a reference server.

use async_trait::async_trait;
use prefsync_client::requester::{RequestFailure, Requester};
use prefsync_protocol::{WireRequest, WireResponse};
use prefsync_server::SyncStoreServer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A requester that hands envelopes straight to a [`SyncStoreServer`].
///
/// Keeps a full client/server exchange inside one process, with no socket
/// involved. Cloning shares the server.
#[derive(Clone)]
pub struct LoopbackRequester {
    server: Arc<SyncStoreServer>,
}

impl LoopbackRequester {
    /// Creates a requester over the given server.
    pub fn new(server: Arc<SyncStoreServer>) -> Self {
        LoopbackRequester { server }
    }
}

#[async_trait]
impl Requester for LoopbackRequester {
    async fn request(
        &self,
        request: WireRequest,
        cancel: CancellationToken,
    ) -> Result<WireResponse, RequestFailure> {
        if cancel.is_cancelled() {
            return Err(RequestFailure::canceled());
        }
        Ok(self.server.handle(request))
    }
}
