//! Adapter lookup keyed by platform.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use herald_store::Platform;

use crate::{
    AdapterError, DEFAULT_FACEBOOK_GRAPH_URL, DEFAULT_INSTAGRAM_GRAPH_URL, FacebookAdapter,
    GraphClient, InstagramAdapter, PlatformAdapter,
};

/// How the built-in adapters reach their platforms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdapterMode {
    /// Deterministic mock responses, no network.
    #[default]
    Stub,
    /// Real Graph API calls.
    Live,
}

impl fmt::Display for AdapterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdapterMode::Stub => "stub",
            AdapterMode::Live => "live",
        })
    }
}

impl FromStr for AdapterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stub" => Ok(AdapterMode::Stub),
            "live" => Ok(AdapterMode::Live),
            other => Err(format!("unknown adapter mode: {}", other)),
        }
    }
}

/// Adapters registered per platform.
///
/// Platforms without an adapter are reported by callers as not implemented.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with stub Facebook and Instagram adapters.
    pub fn stub() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FacebookAdapter::stub()));
        registry.register(Arc::new(InstagramAdapter::stub()));
        registry
    }

    /// Registry with live adapters against the given Graph hosts.
    pub fn live(
        facebook_url: Option<&str>,
        instagram_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let facebook = GraphClient::new(
            Platform::Facebook,
            facebook_url.unwrap_or(DEFAULT_FACEBOOK_GRAPH_URL),
            timeout,
        )?;
        let instagram = GraphClient::new(
            Platform::Instagram,
            instagram_url.unwrap_or(DEFAULT_INSTAGRAM_GRAPH_URL),
            timeout,
        )?;

        let mut registry = Self::new();
        registry.register(Arc::new(FacebookAdapter::live(facebook)));
        registry.register(Arc::new(InstagramAdapter::live(instagram)));
        Ok(registry)
    }

    /// Register an adapter under its own platform, returning any adapter it replaced.
    pub fn register(
        &mut self,
        adapter: Arc<dyn PlatformAdapter>,
    ) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.insert(adapter.platform(), adapter)
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    /// The adapter for `platform`, or [`AdapterError::Unsupported`].
    pub fn require(&self, platform: Platform) -> Result<Arc<dyn PlatformAdapter>, AdapterError> {
        self.get(platform)
            .ok_or(AdapterError::Unsupported(platform))
    }

    /// Registered platforms in declaration order.
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}
