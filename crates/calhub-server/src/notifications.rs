//! Threshold reminders for upcoming events.
//!
//! A scan looks `lookahead` minutes ahead on every visible account and emits
//! a reminder for each event that starts in 30 or in 5 minutes, measured to
//! the nearest minute. A one-minute scan cadence therefore hits each
//! threshold exactly once; deduplication is left to the consumer through
//! [`Notification::dedup_key`].

use std::fmt;
use std::time::Duration;

use calhub_core::{CalendarEvent, TimeWindow, format_iso};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregator::fetch_account;
use crate::factory::BackendCache;
use crate::registry::CalendarAccount;

/// `event_type` of every calendar reminder.
pub const REMINDER_EVENT_TYPE: &str = "calendar.reminder_upcoming";

/// Reminder thresholds in minutes, with their urgency.
pub const THRESHOLDS: [(i64, Urgency); 2] = [(30, Urgency::Info), (5, Urgency::Warning)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Info,
    Warning,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event details carried by a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub calendar: String,
    pub label: String,
    pub event_id: String,
    pub start: String,
    pub location: String,
    pub minutes_until: i64,
}

/// A reminder ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub event_type: String,
    pub title: String,
    pub message: String,
    pub urgency: Urgency,
    /// `calendar:{account}:{event_id}:{threshold}min`
    pub dedup_key: String,
    pub data: NotificationData,
    /// Calendar reminders are always spoken.
    pub tts: bool,
}

impl Notification {
    pub fn reminder(
        account: &CalendarAccount,
        event: &CalendarEvent,
        threshold: i64,
        urgency: Urgency,
    ) -> Self {
        Self {
            event_type: REMINDER_EVENT_TYPE.to_string(),
            title: event.title.clone(),
            message: format!(
                "Termin \"{}\" beginnt in {} Minuten ({})",
                event.title, threshold, account.label
            ),
            urgency,
            dedup_key: dedup_key(&account.name, &event.id, threshold),
            data: NotificationData {
                calendar: account.name.clone(),
                label: account.label.clone(),
                event_id: event.id.clone(),
                start: format_iso(&event.start),
                location: event.location.clone(),
                minutes_until: threshold,
            },
            tts: true,
        }
    }
}

pub fn dedup_key(account: &str, event_id: &str, threshold: i64) -> String {
    format!("calendar:{}:{}:{}min", account, event_id, threshold)
}

/// Minutes from `now` until `start`, rounded to the nearest minute.
pub fn minutes_until(now: NaiveDateTime, start: NaiveDateTime) -> i64 {
    let seconds = (start - now).num_seconds();
    (seconds as f64 / 60.0).round() as i64
}

/// The reminder due for `event` at `now`, if any.
pub fn reminder_for(
    account: &CalendarAccount,
    event: &CalendarEvent,
    now: NaiveDateTime,
) -> Option<Notification> {
    if event.all_day {
        return None;
    }
    let minutes = minutes_until(now, event.start);
    THRESHOLDS
        .iter()
        .find(|(threshold, _)| *threshold == minutes)
        .map(|&(threshold, urgency)| Notification::reminder(account, event, threshold, urgency))
}

/// Scans `accounts` for reminders due at `now`.
///
/// Accounts that fail are logged and skipped. Output follows account order,
/// then event start.
pub async fn pending_notifications(
    cache: &BackendCache,
    accounts: &[&CalendarAccount],
    now: NaiveDateTime,
    lookahead_minutes: u32,
    timeout: Duration,
) -> Vec<Notification> {
    let window = TimeWindow::from_now(now, chrono::Duration::minutes(i64::from(lookahead_minutes)));
    let mut notifications = Vec::new();

    for account in accounts {
        let mut events = match fetch_account(cache, account, window, timeout).await {
            Ok(events) => events,
            Err(e) => {
                warn!(calendar = %account.name, error = %e, "Skipping calendar in notification scan");
                continue;
            }
        };
        events.sort_by_key(|event| event.start);

        let before = notifications.len();
        notifications.extend(events.iter().filter_map(|event| reminder_for(account, event, now)));
        debug!(
            calendar = %account.name,
            scanned = events.len(),
            due = notifications.len() - before,
            "Notification scan"
        );
    }

    notifications
}
