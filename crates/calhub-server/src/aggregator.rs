//! Multi-account event listing with partial-failure semantics.

use std::future::Future;
use std::time::Duration;

use calhub_core::{CalendarEvent, TimeWindow};
use calhub_providers::{BackendError, BackendResult};
use tracing::{debug, warn};

use crate::factory::BackendCache;
use crate::registry::CalendarAccount;

/// Merged events plus one error line per failed account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    /// Events from every successful account, sorted by start.
    pub events: Vec<CalendarEvent>,
    /// `"{account}: {error}"` for each failed account.
    pub errors: Vec<String>,
}

/// Runs `call` with a time budget; expiry is a `timeout` backend error.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> BackendResult<T>
where
    F: Future<Output = BackendResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::timeout(format!(
            "no response within {}s",
            timeout.as_secs()
        ))),
    }
}

/// Lists `window` on one account's backend.
pub async fn fetch_account(
    cache: &BackendCache,
    account: &CalendarAccount,
    window: TimeWindow,
    timeout: Duration,
) -> BackendResult<Vec<CalendarEvent>> {
    let backend = cache.get_or_create(account).await?;
    bounded(timeout, backend.list_events(window.start, window.end)).await
}

/// Lists `window` on every account in turn and merges the results.
///
/// A failing account never aborts the others and contributes no events.
/// The merge is a stable sort by start time.
pub async fn aggregate(
    cache: &BackendCache,
    accounts: &[&CalendarAccount],
    window: TimeWindow,
    timeout: Duration,
) -> Aggregate {
    let mut result = Aggregate::default();

    for account in accounts {
        match fetch_account(cache, account, window, timeout).await {
            Ok(events) => {
                debug!(calendar = %account.name, count = events.len(), "Fetched events");
                result.events.extend(events);
            }
            Err(e) => {
                warn!(calendar = %account.name, error = %e, "Failed to fetch events");
                result.errors.push(format!("{}: {}", account.name, e));
            }
        }
    }

    result.events.sort_by_key(|event| event.start);
    result
}
