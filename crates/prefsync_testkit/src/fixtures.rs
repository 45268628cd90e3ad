//! Client/server fixtures.
//!
//! Wires a [`SyncStoreClient`] to an in-process [`SyncStoreServer`] over
//! the loopback requester, with an in-memory state store standing in for
//! the embedder's persistence.

use crate::requester::LoopbackRequester;
use prefsync_client::config::StoreClientConfig;
use prefsync_client::descriptor::StoreEndpoints;
use prefsync_client::state_store::{MemoryStateStore, SharedStateStore};
use prefsync_client::store::{AuthToken, SyncStoreClient};
use prefsync_server::{ServerConfig, SyncStoreServer};
use std::sync::Arc;

/// Bearer token fixtures authenticate with.
pub const FIXTURE_TOKEN: &str = "fixture-token";

/// Service URL fixtures point at.
pub const FIXTURE_URL: &str = "https://sync.test";

/// A client wired to an in-process server.
pub struct StoreFixture {
    /// The server behind the client.
    pub server: Arc<SyncStoreServer>,
    /// The state store backing the client, shared across reopens.
    pub state: SharedStateStore,
    /// The client under test, already authenticated.
    pub client: SyncStoreClient<LoopbackRequester>,
    client_config: StoreClientConfig,
}

impl StoreFixture {
    /// Creates a fixture with default configurations.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        Self::with_configs(StoreClientConfig::default(), ServerConfig::default())
    }

    /// Creates a fixture with explicit configurations.
    pub fn with_configs(client_config: StoreClientConfig, server_config: ServerConfig) -> Self {
        let server = Arc::new(SyncStoreServer::new(server_config));
        let state: SharedStateStore = Arc::new(MemoryStateStore::new());
        let client = build_client(&client_config, &server, &state);
        client.set_auth_token(AuthToken::new(FIXTURE_TOKEN, "github"));
        StoreFixture {
            server,
            state,
            client,
            client_config,
        }
    }

    /// Rebuilds the client over the same server and state store, as a
    /// process restart would.
    ///
    /// The new client starts without an auth token.
    pub fn reopen(self) -> Self {
        let StoreFixture {
            server,
            state,
            client,
            client_config,
        } = self;
        drop(client);
        let client = build_client(&client_config, &server, &state);
        StoreFixture {
            server,
            state,
            client,
            client_config,
        }
    }

    /// Installs the fixture token on the client.
    pub fn authenticate(&self) {
        self.client
            .set_auth_token(AuthToken::new(FIXTURE_TOKEN, "github"));
    }
}

impl Default for StoreFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(
    config: &StoreClientConfig,
    server: &Arc<SyncStoreServer>,
    state: &SharedStateStore,
) -> SyncStoreClient<LoopbackRequester> {
    SyncStoreClient::new(
        config.clone(),
        StoreEndpoints::new(FIXTURE_URL),
        LoopbackRequester::new(Arc::clone(server)),
        Arc::clone(state),
    )
}
