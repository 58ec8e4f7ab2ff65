//! The `CalendarBackend` contract.
//!
//! Every provider adapter implements exactly five operations: list, create,
//! update, delete and get. Methods return boxed futures so the trait stays
//! object-safe and callers can hold backends as `Arc<dyn CalendarBackend>`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use calhub_core::CalendarEvent;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, BackendErrorCode, BackendResult};

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The supported backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ews,
    Google,
    Caldav,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Ews, Self::Google, Self::Caldav];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ews => "ews",
            Self::Google => "google",
            Self::Caldav => "caldav",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a backend type string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBackendKind(pub String);

impl fmt::Display for UnknownBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown backend type '{}'", self.0)
    }
}

impl std::error::Error for UnknownBackendKind {}

impl FromStr for BackendKind {
    type Err = UnknownBackendKind;

    /// Parses a type name, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or(UnknownBackendKind(normalized))
    }
}

/// Fields for a new event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub description: String,
    pub location: String,
}

impl NewEvent {
    pub fn new(title: impl Into<String>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            title: title.into(),
            start,
            end,
            description: String::new(),
            location: String::new(),
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

    /// Builds the entity a backend reports back after a successful insert.
    pub fn into_event(self, id: impl Into<String>, calendar: impl Into<String>) -> CalendarEvent {
        CalendarEvent::new(id, calendar, self.title, self.start, self.end)
            .with_description(self.description)
            .with_location(self.location)
    }
}

/// A partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub description: Option<String>,
    pub location: Option<String>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.description.is_none()
            && self.location.is_none()
    }

    /// Applies the patch to an already-fetched event.
    pub fn apply_to(&self, event: &mut CalendarEvent) {
        if let Some(ref title) = self.title {
            event.title = title.clone();
        }
        if let Some(start) = self.start {
            event.start = start;
        }
        if let Some(end) = self.end {
            event.end = end;
        }
        if let Some(ref description) = self.description {
            event.description = description.clone();
        }
        if let Some(ref location) = self.location {
            event.location = location.clone();
        }
        if event.end < event.start {
            event.end = event.start;
        }
    }
}

/// The five-operation contract every calendar provider implements.
///
/// Connection setup and authentication are the backend's own business and
/// happen lazily on the first call.
pub trait CalendarBackend: Send + Sync {
    /// The provider family of this backend.
    fn kind(&self) -> BackendKind;

    /// Lists events overlapping `[start, end]`, both naive local time.
    fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> BoxFuture<'_, BackendResult<Vec<CalendarEvent>>>;

    /// Creates an event and returns it as stored.
    fn create_event(&self, event: NewEvent) -> BoxFuture<'_, BackendResult<CalendarEvent>>;

    /// Applies `patch` to the event and returns the updated entity.
    fn update_event<'a>(
        &'a self,
        event_id: &'a str,
        patch: EventPatch,
    ) -> BoxFuture<'a, BackendResult<CalendarEvent>>;

    /// Deletes the event. `Ok(false)` means it did not exist.
    fn delete_event<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, BackendResult<bool>>;

    /// Fetches one event; a missing event is a `not_found` error.
    fn get_event<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, BackendResult<CalendarEvent>>;
}

/// A backend that fails every operation with the same error.
///
/// Stands in for an account whose client could not be built.
#[derive(Debug)]
pub struct ErrorBackend {
    kind: BackendKind,
    code: BackendErrorCode,
    message: String,
}

impl ErrorBackend {
    pub fn new(kind: BackendKind, error: &BackendError) -> Self {
        Self {
            kind,
            code: error.code(),
            message: error.message().to_string(),
        }
    }

    fn error(&self) -> BackendError {
        BackendError::new(self.code, self.message.clone())
    }
}

impl CalendarBackend for ErrorBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn list_events(
        &self,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> BoxFuture<'_, BackendResult<Vec<CalendarEvent>>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn create_event(&self, _event: NewEvent) -> BoxFuture<'_, BackendResult<CalendarEvent>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn update_event<'a>(
        &'a self,
        _event_id: &'a str,
        _patch: EventPatch,
    ) -> BoxFuture<'a, BackendResult<CalendarEvent>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn delete_event<'a>(&'a self, _event_id: &'a str) -> BoxFuture<'a, BackendResult<bool>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn get_event<'a>(&'a self, _event_id: &'a str) -> BoxFuture<'a, BackendResult<CalendarEvent>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 13)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn kind_parsing_is_case_insensitive() {
        assert_eq!("EWS".parse::<BackendKind>().unwrap(), BackendKind::Ews);
        assert_eq!(" google ".parse::<BackendKind>().unwrap(), BackendKind::Google);
        assert_eq!("CalDAV".parse::<BackendKind>().unwrap(), BackendKind::Caldav);

        let err = "outlook".parse::<BackendKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown backend type 'outlook'");
    }

    #[test]
    fn empty_patch() {
        assert!(EventPatch::default().is_empty());
        let patch = EventPatch {
            location: Some("Room 2".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let mut event = CalendarEvent::new("1", "work", "Planning", at(9, 0), at(10, 0))
            .with_description("agenda");
        let patch = EventPatch {
            title: Some("Replanning".into()),
            end: Some(at(11, 0)),
            ..Default::default()
        };
        patch.apply_to(&mut event);

        assert_eq!(event.title, "Replanning");
        assert_eq!(event.start, at(9, 0));
        assert_eq!(event.end, at(11, 0));
        assert_eq!(event.description, "agenda");
    }

    #[test]
    fn new_event_into_entity() {
        let event = NewEvent::new("Dentist", at(14, 0), at(15, 0))
            .with_location("Main St")
            .into_event("abc", "family");
        assert_eq!(event.id, "abc");
        assert_eq!(event.calendar, "family");
        assert_eq!(event.location, "Main St");
        assert!(!event.all_day);
    }

    #[tokio::test]
    async fn error_backend_fails_everything() {
        let backend = ErrorBackend::new(
            BackendKind::Caldav,
            &BackendError::configuration("invalid url"),
        );
        assert_eq!(backend.kind(), BackendKind::Caldav);

        let err = backend.list_events(at(0, 0), at(23, 59)).await.unwrap_err();
        assert_eq!(err.code(), BackendErrorCode::ConfigurationError);
        assert_eq!(err.message(), "invalid url");

        assert!(backend.delete_event("x").await.is_err());
        assert!(backend.get_event("x").await.is_err());
    }
}
