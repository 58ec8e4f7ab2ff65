//! Time handling for calendar events.
//!
//! Every timestamp that crosses a backend boundary is a naive local
//! datetime: backends strip the provider timezone after converting into the
//! host's local time. This module provides [`parse_datetime`] for the
//! ISO-8601 strings accepted at the tool surface, the [`iso`] serde adapter
//! used by [`CalendarEvent`](crate::CalendarEvent), and [`TimeWindow`] for
//! query ranges.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical output format (`2026-02-13T14:00:00`).
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Errors produced while parsing user supplied timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("empty timestamp")]
    Empty,

    #[error("unrecognized timestamp: {0}")]
    Invalid(String),
}

/// A parsed timestamp that remembers whether the input carried a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTime {
    pub value: NaiveDateTime,
    pub date_only: bool,
}

impl ParsedTime {
    fn date(date: NaiveDate) -> Self {
        Self {
            value: start_of_day(date),
            date_only: true,
        }
    }

    fn datetime(value: NaiveDateTime) -> Self {
        Self {
            value,
            date_only: false,
        }
    }

    /// Value to use when this timestamp closes a range.
    ///
    /// A date-only input means "until the end of that day".
    pub fn as_range_end(&self) -> NaiveDateTime {
        if self.date_only {
            end_of_day(self.value.date())
        } else {
            self.value
        }
    }
}

/// Parses an ISO-8601 date or datetime.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS[.fff]]` (a space separator is
/// also accepted) and RFC 3339 timestamps with an offset. Offset timestamps
/// are converted to host local time before the offset is dropped.
pub fn parse_datetime(input: &str) -> Result<ParsedTime, TimeParseError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(TimeParseError::Empty);
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(ParsedTime::date(date));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(ParsedTime::datetime(dt.with_timezone(&Local).naive_local()));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(ParsedTime::datetime)
        .ok_or_else(|| TimeParseError::Invalid(value.to_string()))
}

/// Formats a naive timestamp the way every tool result renders it.
pub fn format_iso(dt: &NaiveDateTime) -> String {
    dt.format(ISO_FORMAT).to_string()
}

/// Midnight at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// 23:59:59 on `date`.
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| start_of_day(date))
}

/// Current wall-clock time in the host timezone, without offset.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Interprets a naive local timestamp as an instant.
///
/// Wall-clock times skipped by a DST change are read as UTC.
pub fn local_to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&dt)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| dt.and_utc())
}

/// Converts an instant into naive local time.
pub fn to_local_naive<Tz: TimeZone>(dt: &DateTime<Tz>) -> NaiveDateTime {
    dt.with_timezone(&Local).naive_local()
}

/// Serde adapter rendering [`NaiveDateTime`] as [`ISO_FORMAT`].
pub mod iso {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&dt.format(super::ISO_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_datetime(&raw)
            .map(|parsed| parsed.value)
            .map_err(de::Error::custom)
    }
}

/// A query range over naive local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "iso")]
    pub start: NaiveDateTime,
    #[serde(with = "iso")]
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// The whole of `date`, from 00:00:00 to 23:59:59.
    pub fn day_of(date: NaiveDate) -> Self {
        Self::new(start_of_day(date), end_of_day(date))
    }

    /// Creates a window starting at `now` and extending `duration`.
    pub fn from_now(now: NaiveDateTime, duration: Duration) -> Self {
        Self::new(now, now + duration)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Checks if an event spanning `[start, end)` intersects this window.
    ///
    /// Zero-length events count when their start lies in `[self.start, self.end)`.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        if start >= end {
            return self.start <= start && start < self.end;
        }
        start < self.end && end > self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_utc_round_trip_keeps_wall_clock() {
        let noon = at(2026, 6, 1, 12, 0, 0);
        assert_eq!(to_local_naive(&local_to_utc(noon)), noon);
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    mod parsing {
        use super::*;

        #[test]
        fn date_only() {
            let parsed = parse_datetime("2026-02-13").unwrap();
            assert!(parsed.date_only);
            assert_eq!(parsed.value, at(2026, 2, 13, 0, 0, 0));
            assert_eq!(parsed.as_range_end(), at(2026, 2, 13, 23, 59, 59));
        }

        #[test]
        fn full_datetime() {
            let parsed = parse_datetime("2026-02-13T14:00:00").unwrap();
            assert!(!parsed.date_only);
            assert_eq!(parsed.value, at(2026, 2, 13, 14, 0, 0));
            assert_eq!(parsed.as_range_end(), parsed.value);
        }

        #[test]
        fn minutes_and_space_separator() {
            assert_eq!(
                parse_datetime("2026-02-13T09:30").unwrap().value,
                at(2026, 2, 13, 9, 30, 0)
            );
            assert_eq!(
                parse_datetime("2026-02-13 09:30:15").unwrap().value,
                at(2026, 2, 13, 9, 30, 15)
            );
        }

        #[test]
        fn fractional_seconds() {
            let parsed = parse_datetime("2026-02-13T09:30:15.250").unwrap();
            assert_eq!(parsed.value.format(ISO_FORMAT).to_string(), "2026-02-13T09:30:15");
        }

        #[test]
        fn rejects_garbage() {
            assert_eq!(parse_datetime("   "), Err(TimeParseError::Empty));
            assert_eq!(
                parse_datetime("not-a-date"),
                Err(TimeParseError::Invalid("not-a-date".into()))
            );
            assert!(parse_datetime("2026-13-45").is_err());
        }
    }

    mod window {
        use super::*;

        #[test]
        fn day_of_spans_whole_day() {
            let window = TimeWindow::day_of(NaiveDate::from_ymd_opt(2026, 2, 13).unwrap());
            assert_eq!(window.start, at(2026, 2, 13, 0, 0, 0));
            assert_eq!(window.end, at(2026, 2, 13, 23, 59, 59));
        }

        #[test]
        fn from_now_duration() {
            let now = at(2026, 2, 13, 10, 0, 0);
            let window = TimeWindow::from_now(now, Duration::minutes(45));
            assert_eq!(window.end, at(2026, 2, 13, 10, 45, 0));
            assert_eq!(window.duration(), Duration::minutes(45));
        }

        #[test]
        fn overlaps() {
            let window = TimeWindow::new(at(2026, 2, 13, 9, 0, 0), at(2026, 2, 13, 17, 0, 0));

            assert!(window.overlaps(at(2026, 2, 13, 10, 0, 0), at(2026, 2, 13, 11, 0, 0)));
            assert!(window.overlaps(at(2026, 2, 13, 8, 0, 0), at(2026, 2, 13, 10, 0, 0)));
            assert!(window.overlaps(at(2026, 2, 13, 16, 0, 0), at(2026, 2, 13, 18, 0, 0)));
            assert!(window.overlaps(at(2026, 2, 13, 8, 0, 0), at(2026, 2, 13, 18, 0, 0)));

            // Touching edges
            assert!(!window.overlaps(at(2026, 2, 13, 8, 0, 0), at(2026, 2, 13, 9, 0, 0)));
            assert!(!window.overlaps(at(2026, 2, 13, 17, 0, 0), at(2026, 2, 13, 18, 0, 0)));

            // Zero-length
            assert!(window.overlaps(at(2026, 2, 13, 9, 0, 0), at(2026, 2, 13, 9, 0, 0)));
            assert!(!window.overlaps(at(2026, 2, 13, 17, 0, 0), at(2026, 2, 13, 17, 0, 0)));
        }

        #[test]
        fn serializes_as_iso_strings() {
            let window = TimeWindow::new(at(2026, 2, 13, 9, 0, 0), at(2026, 2, 13, 17, 0, 0));
            let json = serde_json::to_value(window).unwrap();
            assert_eq!(
                json,
                serde_json::json!({"start": "2026-02-13T09:00:00", "end": "2026-02-13T17:00:00"})
            );
        }
    }
}
