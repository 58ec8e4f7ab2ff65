//! Backend construction and the per-account backend cache.

use std::collections::HashMap;
use std::sync::Arc;

use calhub_providers::{BackendError, BackendKind, BackendResult, CalendarBackend};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::registry::CalendarAccount;

/// Builds a backend for an account.
///
/// Construction only validates settings; connecting and authenticating are
/// left to the backend's first call.
pub trait BackendFactory: Send + Sync {
    fn create(&self, account: &CalendarAccount) -> BackendResult<Arc<dyn CalendarBackend>>;
}

/// Builds the provider adapter matching the account type.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProviderFactory;

impl ProviderFactory {
    fn build(&self, account: &CalendarAccount) -> BackendResult<Arc<dyn CalendarBackend>> {
        match account.kind {
            #[cfg(feature = "caldav")]
            BackendKind::Caldav => {
                let settings = account.settings::<calhub_providers::caldav::CalDavSettings>()?;
                let backend = calhub_providers::caldav::CalDavBackend::new(&account.name, &settings)?;
                Ok(Arc::new(backend))
            }
            #[cfg(feature = "google")]
            BackendKind::Google => {
                let settings = account.settings::<calhub_providers::google::GoogleSettings>()?;
                Ok(Arc::new(calhub_providers::google::GoogleBackend::new(
                    &account.name,
                    &settings,
                )))
            }
            #[cfg(feature = "ews")]
            BackendKind::Ews => {
                let settings = account.settings::<calhub_providers::ews::EwsSettings>()?;
                let backend = calhub_providers::ews::EwsBackend::new(&account.name, &settings)?;
                Ok(Arc::new(backend))
            }
            #[allow(unreachable_patterns)]
            kind => Err(BackendError::configuration(format!(
                "Calendar '{}': {} support is not compiled in",
                account.name, kind
            ))),
        }
    }
}

impl BackendFactory for ProviderFactory {
    fn create(&self, account: &CalendarAccount) -> BackendResult<Arc<dyn CalendarBackend>> {
        self.build(account)
            .map_err(|e| e.with_backend(account.kind.as_str()))
    }
}

/// Lazily built backends, one per account name.
///
/// The first successful construction is kept for the cache's lifetime. A
/// failed construction is not stored, so the next call tries again.
pub struct BackendCache {
    factory: Arc<dyn BackendFactory>,
    backends: Mutex<HashMap<String, Arc<dyn CalendarBackend>>>,
}

impl BackendCache {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            backends: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached backend for `account`, building it on first use.
    pub async fn get_or_create(
        &self,
        account: &CalendarAccount,
    ) -> BackendResult<Arc<dyn CalendarBackend>> {
        let mut backends = self.backends.lock().await;
        if let Some(backend) = backends.get(&account.name) {
            return Ok(Arc::clone(backend));
        }

        match self.factory.create(account) {
            Ok(backend) => {
                info!(calendar = %account.name, kind = %account.kind, "Backend initialized");
                backends.insert(account.name.clone(), Arc::clone(&backend));
                Ok(backend)
            }
            Err(e) => {
                warn!(calendar = %account.name, error = %e, "Backend construction failed");
                Err(e)
            }
        }
    }

    /// Number of backends built so far.
    pub async fn len(&self) -> usize {
        self.backends.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl std::fmt::Debug for BackendCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCache").finish_non_exhaustive()
    }
}
