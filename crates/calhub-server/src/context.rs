//! Shared application state: the registry, the backend cache and runtime knobs.

use std::sync::Arc;
use std::time::Duration;

use calhub_providers::{BackendResult, CalendarBackend};

use crate::factory::{BackendCache, BackendFactory, ProviderFactory};
use crate::registry::{AccountRegistry, CalendarAccount};

/// Default lookahead for notification scans, in minutes.
pub const DEFAULT_LOOKAHEAD_MINUTES: u32 = 45;

/// Runtime configuration for an [`AppContext`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Time budget for a single backend call.
    pub backend_timeout: Duration,

    /// Lookahead used when a notification scan does not name one.
    pub default_lookahead_minutes: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(30),
            default_lookahead_minutes: DEFAULT_LOOKAHEAD_MINUTES,
        }
    }
}

impl ContextConfig {
    /// Builder: set the per-call backend timeout.
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Builder: set the default notification lookahead.
    pub fn with_default_lookahead(mut self, minutes: u32) -> Self {
        self.default_lookahead_minutes = minutes;
        self
    }
}

/// Everything a tool call needs.
///
/// The registry is immutable once loaded; backends are built on first use
/// and kept for the context's lifetime.
#[derive(Debug)]
pub struct AppContext {
    registry: Arc<AccountRegistry>,
    cache: BackendCache,
    config: ContextConfig,
}

impl AppContext {
    /// Creates a context that builds real provider backends.
    pub fn new(registry: AccountRegistry) -> Self {
        Self::with_factory(registry, Arc::new(ProviderFactory))
    }

    pub fn with_factory(registry: AccountRegistry, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            registry: Arc::new(registry),
            cache: BackendCache::new(factory),
            config: ContextConfig::default(),
        }
    }

    /// Builder: replace the runtime configuration.
    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &BackendCache {
        &self.cache
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Backend for the named account; `Ok(None)` when the name is unknown.
    pub async fn get_backend(&self, name: &str) -> BackendResult<Option<Arc<dyn CalendarBackend>>> {
        match self.registry.get(name) {
            Some(account) => self.backend_for(account).await.map(Some),
            None => Ok(None),
        }
    }

    /// Backend for an account already resolved from this registry.
    pub async fn backend_for(
        &self,
        account: &CalendarAccount,
    ) -> BackendResult<Arc<dyn CalendarBackend>> {
        self.cache.get_or_create(account).await
    }
}
