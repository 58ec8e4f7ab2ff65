//! Server error types.

use std::io;
use std::path::PathBuf;

use calhub_core::format_iso;
use calhub_providers::{BackendError, BackendKind};
use chrono::NaiveDateTime;
use thiserror::Error;

/// Result type for registry loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading the accounts file. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed YAML or a `calendars` value of the wrong shape.
    #[error("Invalid calendar config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Calendar missing 'name' field")]
    MissingName,

    #[error("Duplicate calendar name: '{name}'")]
    DuplicateName { name: String },

    #[error("Calendar '{name}': unknown type '{kind}'. Must be one of: ews, google, caldav")]
    UnknownType { name: String, kind: String },

    #[error("Calendar '{name}': invalid visibility '{value}'. Must be 'shared' or 'owner'")]
    InvalidVisibility { name: String, value: String },

    #[error("Calendar '{name}': visibility 'owner' requires 'owner_id'")]
    MissingOwner { name: String },

    #[error("Calendar '{name}': invalid owner_id '{value}'. Must be an integer")]
    InvalidOwner { name: String, value: String },

    /// A field the account type needs is absent.
    #[error("Calendar '{name}' ({kind}): {}", requirement(.fields))]
    MissingField {
        name: String,
        kind: BackendKind,
        fields: Vec<&'static str>,
    },
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    pub fn unknown_type(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::UnknownType {
            name: name.into(),
            kind: kind.into(),
        }
    }

    pub fn invalid_visibility(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidVisibility {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn missing_owner(name: impl Into<String>) -> Self {
        Self::MissingOwner { name: name.into() }
    }

    pub fn invalid_owner(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidOwner {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn missing_field(
        name: impl Into<String>,
        kind: BackendKind,
        fields: Vec<&'static str>,
    ) -> Self {
        Self::MissingField {
            name: name.into(),
            kind,
            fields,
        }
    }
}

fn requirement(fields: &[&str]) -> String {
    match fields {
        [single] => format!("'{}' is required", single),
        _ => {
            let quoted: Vec<String> = fields.iter().map(|f| format!("'{}'", f)).collect();
            format!("{} are required", quoted.join(" and "))
        }
    }
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors a tool reports as `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("No calendars configured. Set CALENDAR_CONFIG env var.")]
    NoCalendars,

    #[error("Unknown calendar '{name}'. Available: {available:?}")]
    UnknownCalendar {
        name: String,
        available: Vec<String>,
    },

    #[error("Access denied to calendar '{name}'")]
    AccessDenied { name: String },

    /// `field` is `start` or `end`.
    #[error("Invalid {field} date: {value}")]
    InvalidDate { field: &'static str, value: String },

    /// `end` lies before `start`.
    #[error("Invalid time range: end {end} is before start {start}")]
    InvalidRange { start: String, end: String },

    #[error("No fields to update")]
    NoFieldsToUpdate,

    #[error("Event not found: {id}")]
    EventNotFound { id: String },

    /// A backend call failed; `action` is `create`, `update`, `delete` or `get`.
    #[error("Failed to {action} event: {source}")]
    Backend {
        action: &'static str,
        #[source]
        source: BackendError,
    },
}

impl ToolError {
    pub fn unknown_calendar(name: impl Into<String>, available: Vec<String>) -> Self {
        Self::UnknownCalendar {
            name: name.into(),
            available,
        }
    }

    pub fn access_denied(name: impl Into<String>) -> Self {
        Self::AccessDenied { name: name.into() }
    }

    pub fn invalid_date(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidDate {
            field,
            value: value.into(),
        }
    }

    pub fn invalid_range(start: &NaiveDateTime, end: &NaiveDateTime) -> Self {
        Self::InvalidRange {
            start: format_iso(start),
            end: format_iso(end),
        }
    }

    pub fn event_not_found(id: impl Into<String>) -> Self {
        Self::EventNotFound { id: id.into() }
    }

    /// Wraps a backend failure. A `not_found` error becomes [`ToolError::EventNotFound`].
    pub fn backend(action: &'static str, event_id: Option<&str>, source: BackendError) -> Self {
        match event_id {
            Some(id) if source.is_not_found() => Self::event_not_found(id),
            _ => Self::Backend { action, source },
        }
    }

    /// Renders the error as a tool result.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}
