//! Account registry, visibility, aggregation, notifications and the tool surface.
//!
//! This crate ties calendar backends together:
//! - [`AccountRegistry`] loads and validates the YAML accounts file
//! - [`BackendCache`] builds one backend per account on first use
//! - [`aggregate`] merges events across accounts and tolerates failures
//! - [`pending_notifications`] emits 30- and 5-minute reminders
//! - [`Tools`] exposes everything as JSON-returning tool calls
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use calhub_server::{AccountRegistry, AppContext, ListEventsArgs, Tools};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = AccountRegistry::from_env()?;
//!     let tools = Tools::new(Arc::new(AppContext::new(registry)));
//!
//!     let today = tools.list_events(ListEventsArgs::default()).await;
//!     println!("{today}");
//!     Ok(())
//! }
//! ```

mod aggregator;
mod context;
mod error;
mod factory;
mod notifications;
mod notify;
mod registry;
mod tools;
mod visibility;
mod watch;

#[cfg(test)]
mod testing;

pub use aggregator::{Aggregate, aggregate, bounded, fetch_account};
pub use context::{AppContext, ContextConfig, DEFAULT_LOOKAHEAD_MINUTES};
pub use error::{ConfigError, ConfigResult, ToolError, ToolResult};
pub use factory::{BackendCache, BackendFactory, ProviderFactory};
pub use notifications::{
    Notification, NotificationData, REMINDER_EVENT_TYPE, THRESHOLDS, Urgency, dedup_key,
    minutes_until, pending_notifications, reminder_for,
};
pub use notify::{DesktopNotifier, NotifyConfig, NotifyState, SharedNotifyState, new_notify_state};
pub use registry::{
    AccountRegistry, CONFIG_ENV, CalendarAccount, DEFAULT_CONFIG_PATH, Visibility,
};
pub use tools::{CreateEventArgs, EventRef, ListEventsArgs, ToolCall, Tools, UpdateEventArgs};
pub use visibility::{resolve_account, visible_accounts, visible_names};
pub use watch::{WatchConfig, Watcher};
