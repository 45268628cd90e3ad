//! Server configuration.

/// Configuration for the reference store server.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Bearer token requests must present. `None` accepts any token.
    pub expected_token: Option<String>,
}

impl ServerConfig {
    /// Creates a configuration that accepts any bearer token.
    pub fn new() -> Self {
        ServerConfig {
            expected_token: None,
        }
    }

    /// Requires requests to present this bearer token.
    pub fn with_expected_token(mut self, token: impl Into<String>) -> Self {
        self.expected_token = Some(token.into());
        self
    }
}
