//! Store endpoints and service switching.

use crate::state_store::{state_keys, SharedStateStore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the configured service URLs a descriptor points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    /// The stable service.
    Stable,
    /// The insiders service.
    Insiders,
}

impl UrlKind {
    /// Returns the kind name used in persisted state.
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlKind::Stable => "stable",
            UrlKind::Insiders => "insiders",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "stable" => Some(UrlKind::Stable),
            "insiders" => Some(UrlKind::Insiders),
            _ => None,
        }
    }
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authentication provider the store accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationProvider {
    /// Provider id, such as `github`.
    pub id: String,
    /// Scopes to request from the provider.
    pub scopes: Vec<String>,
}

impl AuthenticationProvider {
    /// Creates a provider entry.
    pub fn new(id: impl Into<String>, scopes: Vec<String>) -> Self {
        AuthenticationProvider {
            id: id.into(),
            scopes,
        }
    }
}

/// Service endpoints supplied by the embedding application.
///
/// Only `default_url` is required for a usable store; with no URLs at all
/// the client resolves no descriptor and refuses every operation.
#[derive(Debug, Clone, Default)]
pub struct StoreEndpoints {
    /// URL used until the user switches, `None` when sync is unavailable.
    pub default_url: Option<String>,
    /// Stable service URL, falls back to `default_url`.
    pub stable_url: Option<String>,
    /// Insiders service URL, falls back to `default_url`.
    pub insiders_url: Option<String>,
    /// Whether the user may switch between stable and insiders.
    pub can_switch: bool,
    /// Authentication providers accepted by the service.
    pub authentication_providers: Vec<AuthenticationProvider>,
}

impl StoreEndpoints {
    /// Creates endpoints with only a default URL.
    pub fn new(default_url: impl Into<String>) -> Self {
        StoreEndpoints {
            default_url: Some(default_url.into()),
            ..StoreEndpoints::default()
        }
    }

    /// Sets the stable service URL.
    pub fn with_stable_url(mut self, url: impl Into<String>) -> Self {
        self.stable_url = Some(url.into());
        self
    }

    /// Sets the insiders service URL.
    pub fn with_insiders_url(mut self, url: impl Into<String>) -> Self {
        self.insiders_url = Some(url.into());
        self
    }

    /// Allows switching between services.
    pub fn with_switching(mut self) -> Self {
        self.can_switch = true;
        self
    }

    /// Adds an authentication provider.
    pub fn with_authentication_provider(mut self, provider: AuthenticationProvider) -> Self {
        self.authentication_providers.push(provider);
        self
    }
}

/// A resolved view of the store service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStoreDescriptor {
    /// URL requests are sent to.
    pub url: String,
    /// Which service the URL belongs to.
    pub kind: UrlKind,
    /// Which service the default URL belongs to.
    pub default_kind: UrlKind,
    /// URL used when no switch is recorded.
    pub default_url: String,
    /// Stable service URL.
    pub stable_url: String,
    /// Insiders service URL.
    pub insiders_url: String,
    /// Whether the user may switch between stable and insiders.
    pub can_switch: bool,
    /// Authentication providers accepted by the service.
    pub authentication_providers: Vec<AuthenticationProvider>,
}

/// Resolves descriptors and persists the user's switch choice.
pub(crate) struct StoreSelection {
    store: SharedStateStore,
}

impl StoreSelection {
    pub(crate) fn new(store: SharedStateStore) -> Self {
        StoreSelection { store }
    }

    /// Resolves the descriptor for the given endpoints.
    ///
    /// A persisted switch is honored only while switching is allowed. When
    /// no switch is recorded, a default URL matching only the insiders URL
    /// counts as insiders.
    pub(crate) fn resolve(&self, endpoints: &StoreEndpoints) -> Option<SyncStoreDescriptor> {
        let default_url = endpoints.default_url.clone()?;
        let stable_url = endpoints
            .stable_url
            .clone()
            .unwrap_or_else(|| default_url.clone());
        let insiders_url = endpoints
            .insiders_url
            .clone()
            .unwrap_or_else(|| default_url.clone());
        let switched = if endpoints.can_switch {
            self.store
                .get(state_keys::URL_KIND)
                .as_deref()
                .and_then(UrlKind::parse)
        } else {
            None
        };
        let default_kind = if default_url == insiders_url && default_url != stable_url {
            UrlKind::Insiders
        } else {
            UrlKind::Stable
        };
        let kind = switched.unwrap_or(default_kind);
        let url = match switched {
            Some(UrlKind::Stable) => stable_url.clone(),
            Some(UrlKind::Insiders) => insiders_url.clone(),
            None => default_url.clone(),
        };
        Some(SyncStoreDescriptor {
            url,
            kind,
            default_kind,
            default_url,
            stable_url,
            insiders_url,
            can_switch: endpoints.can_switch,
            authentication_providers: endpoints.authentication_providers.clone(),
        })
    }

    /// Records a switch to the given kind.
    pub(crate) fn record_switch(&self, kind: UrlKind) {
        self.store.set(state_keys::URL_KIND, kind.as_str());
    }

    /// Forgets any recorded switch.
    pub(crate) fn reset(&self) {
        self.store.remove(state_keys::URL_KIND);
    }

    /// Persists a snapshot of the resolved descriptor.
    pub(crate) fn remember(&self, descriptor: &SyncStoreDescriptor) {
        if let Ok(snapshot) = serde_json::to_string(descriptor) {
            self.store.set(state_keys::PREVIOUS_STORE, &snapshot);
        }
    }

    /// Returns the descriptor snapshot recorded by an earlier resolution.
    pub(crate) fn previous(&self) -> Option<SyncStoreDescriptor> {
        let snapshot = self.store.get(state_keys::PREVIOUS_STORE)?;
        serde_json::from_str(&snapshot).ok()
    }
}
