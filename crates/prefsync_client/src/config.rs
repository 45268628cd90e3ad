//! Client configuration.

use std::time::Duration;

/// Configuration for the store client.
#[derive(Debug, Clone)]
pub struct StoreClientConfig {
    /// Client application name, sent with every request.
    pub client_name: String,
    /// Client application version, sent with every request.
    pub client_version: String,
    /// Build commit hash, sent when known.
    pub client_commit: Option<String>,
    /// Requests allowed per budget window.
    pub request_limit: usize,
    /// Length of the request budget window.
    pub request_interval: Duration,
}

impl StoreClientConfig {
    /// Creates a configuration for the given client application.
    pub fn new(client_name: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            client_version: client_version.into(),
            client_commit: None,
            request_limit: 100,
            request_interval: Duration::from_secs(300),
        }
    }

    /// Sets the build commit hash.
    pub fn with_client_commit(mut self, commit: impl Into<String>) -> Self {
        self.client_commit = Some(commit.into());
        self
    }

    /// Sets the local request budget.
    pub fn with_request_budget(mut self, limit: usize, interval: Duration) -> Self {
        self.request_limit = limit;
        self.request_interval = interval;
        self
    }
}

impl Default for StoreClientConfig {
    fn default() -> Self {
        StoreClientConfig::new("prefsync", env!("CARGO_PKG_VERSION"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = StoreClientConfig::new("editor", "1.2.3")
            .with_client_commit("abc123")
            .with_request_budget(5, Duration::from_secs(60));
        assert_eq!(config.client_name, "editor");
        assert_eq!(config.client_commit.as_deref(), Some("abc123"));
        assert_eq!(config.request_limit, 5);
        assert_eq!(config.request_interval, Duration::from_secs(60));
    }
}
