//! Per-requester account filtering.
//!
//! Every tool filters the registry through here before touching a backend.

use crate::error::{ToolError, ToolResult};
use crate::registry::{AccountRegistry, CalendarAccount};

/// Accounts `requester` may see, in registry order.
pub fn visible_accounts(
    registry: &AccountRegistry,
    requester: Option<i64>,
) -> Vec<&CalendarAccount> {
    registry
        .iter()
        .filter(|account| account.is_visible_to(requester))
        .collect()
}

/// Names of the accounts `requester` may see.
pub fn visible_names(registry: &AccountRegistry, requester: Option<i64>) -> Vec<String> {
    visible_accounts(registry, requester)
        .into_iter()
        .map(|account| account.name.clone())
        .collect()
}

/// Looks up one named account on behalf of `requester`.
///
/// An account that exists but is hidden from the requester is
/// [`ToolError::AccessDenied`], not [`ToolError::UnknownCalendar`].
pub fn resolve_account<'a>(
    registry: &'a AccountRegistry,
    name: &str,
    requester: Option<i64>,
) -> ToolResult<&'a CalendarAccount> {
    if registry.is_empty() {
        return Err(ToolError::NoCalendars);
    }
    let account = registry
        .get(name)
        .ok_or_else(|| ToolError::unknown_calendar(name, visible_names(registry, requester)))?;
    if !account.is_visible_to(requester) {
        return Err(ToolError::access_denied(name));
    }
    Ok(account)
}
