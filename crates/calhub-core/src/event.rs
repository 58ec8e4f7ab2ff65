//! The unified calendar event.
//!
//! [`CalendarEvent`] is the only event shape that leaves a backend. Backends
//! normalize provider data into it: timestamps are naive local time, a
//! missing title becomes [`UNTITLED`], and an end before the start is clamped.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::time::iso;

/// Title substituted when a provider returns an event without one.
pub const UNTITLED: &str = "(Kein Titel)";

/// A calendar event as returned by any backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Provider-assigned identifier.
    pub id: String,
    /// Name of the owning account (e.g. `work`, `family`).
    pub calendar: String,
    pub title: String,
    #[serde(with = "iso")]
    pub start: NaiveDateTime,
    #[serde(with = "iso")]
    pub end: NaiveDateTime,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub all_day: bool,
}

impl CalendarEvent {
    /// Creates an event, applying the title fallback and `end >= start`.
    pub fn new(
        id: impl Into<String>,
        calendar: impl Into<String>,
        title: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Self {
        let title = title.into();
        let title = if title.trim().is_empty() {
            UNTITLED.to_string()
        } else {
            title
        };
        Self {
            id: id.into(),
            calendar: calendar.into(),
            title,
            start,
            end: end.max(start),
            description: String::new(),
            location: String::new(),
            all_day: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }
}
