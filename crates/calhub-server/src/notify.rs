//! Reminder delivery: dedup bookkeeping and desktop popups.
//!
//! The notification generator never deduplicates. A consumer polling it keeps
//! a [`NotifyState`] and delivers each `dedup_key` at most once.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[cfg(target_os = "linux")]
use notify_rust::Urgency as DesktopUrgency;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::notifications::{Notification, Urgency};

/// Desktop popup settings.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Application name shown by the notification daemon.
    pub app_name: String,
    /// Popup timeout in seconds.
    pub timeout_secs: u32,
    /// Custom notification icon path.
    pub icon_path: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            app_name: "calhub".to_string(),
            timeout_secs: 10,
            icon_path: None,
        }
    }
}

impl NotifyConfig {
    /// Builder: set timeout.
    pub fn with_timeout(mut self, secs: u32) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Builder: set icon path.
    pub fn with_icon_path(mut self, path: impl Into<String>) -> Self {
        self.icon_path = Some(path.into());
        self
    }
}

/// Dedup keys already delivered.
#[derive(Debug, Default)]
pub struct NotifyState {
    sent: HashSet<String>,
}

impl NotifyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_sent(&self, dedup_key: &str) -> bool {
        self.sent.contains(dedup_key)
    }

    pub fn mark_sent(&mut self, dedup_key: impl Into<String>) {
        self.sent.insert(dedup_key.into());
    }

    /// Keeps only the notifications not delivered yet and marks them sent.
    pub fn take_new(&mut self, notifications: Vec<Notification>) -> Vec<Notification> {
        notifications
            .into_iter()
            .filter(|n| self.sent.insert(n.dedup_key.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }

    /// Forgets every key once more than `max_size` are stored.
    ///
    /// Thresholds are point matches, so a forgotten key is not seen again
    /// once its minute has passed.
    pub fn cleanup_old_keys(&mut self, max_size: usize) {
        if self.sent.len() > max_size {
            debug!(size = self.sent.len(), "Clearing delivered notification keys");
            self.sent.clear();
        }
    }
}

/// Shared notification state.
pub type SharedNotifyState = Arc<RwLock<NotifyState>>;

/// Creates a new shared notification state.
pub fn new_notify_state() -> SharedNotifyState {
    Arc::new(RwLock::new(NotifyState::new()))
}

/// Shows reminders as desktop notifications.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier {
    config: NotifyConfig,
}

impl DesktopNotifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }

    /// Shows one popup. Returns whether the daemon accepted it.
    pub fn show(&self, notification: &Notification) -> bool {
        let mut popup = notify_rust::Notification::new();
        popup
            .appname(&self.config.app_name)
            .summary(&notification.title)
            .body(&notification.message)
            .timeout(Duration::from_secs(u64::from(self.config.timeout_secs)));

        if let Some(ref icon) = self.config.icon_path {
            popup.icon(icon);
        }

        #[cfg(target_os = "linux")]
        popup.urgency(desktop_urgency(notification.urgency));

        match popup.show() {
            Ok(_) => {
                info!(dedup_key = %notification.dedup_key, "Desktop notification sent");
                true
            }
            Err(e) => {
                error!(error = %e, dedup_key = %notification.dedup_key, "Failed to send desktop notification");
                false
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn desktop_urgency(urgency: Urgency) -> DesktopUrgency {
    match urgency {
        Urgency::Info => DesktopUrgency::Normal,
        Urgency::Warning => DesktopUrgency::Critical,
    }
}
