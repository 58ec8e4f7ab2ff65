//! Core types: the unified calendar event, naive-local time helpers, tracing

pub mod event;
pub mod time;
pub mod tracing;

pub use event::{CalendarEvent, UNTITLED};
pub use time::{
    ISO_FORMAT, ParsedTime, TimeParseError, TimeWindow, end_of_day, format_iso, local_now,
    local_to_utc, parse_datetime, start_of_day, to_local_naive,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
