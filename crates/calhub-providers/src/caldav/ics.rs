//! iCalendar (RFC 5545) parsing and generation.

use chrono::{Local, NaiveDateTime, NaiveTime};
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike,
};
use tracing::{debug, warn};

use calhub_core::{CalendarEvent, local_now};

use crate::backend::{EventPatch, NewEvent};
use crate::error::{BackendError, BackendResult};

/// Parses every VEVENT in `ics` into events owned by `account`.
///
/// Components without a UID are skipped. Cancelled occurrences are dropped.
pub fn parse_events(ics: &str, account: &str) -> Vec<CalendarEvent> {
    let calendar = match ics.parse::<Calendar>() {
        Ok(calendar) => calendar,
        Err(e) => {
            warn!(error = %e, "Failed to parse ICS content");
            return Vec::new();
        }
    };

    calendar
        .components
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(event) => convert_event(event, account),
            _ => None,
        })
        .collect()
}

fn convert_event(event: &Event, account: &str) -> Option<CalendarEvent> {
    let uid = event.get_uid()?;
    if event
        .property_value("STATUS")
        .is_some_and(|status| status.eq_ignore_ascii_case("CANCELLED"))
    {
        return None;
    }

    let (start, all_day) = match event.get_start() {
        Some(value) => to_local(value),
        None => (local_now(), false),
    };
    let end = event.get_end().map(|value| to_local(value).0).unwrap_or(start);

    let parsed = CalendarEvent::new(uid, account, event.get_summary().unwrap_or_default(), start, end)
        .with_description(event.get_description().unwrap_or_default())
        .with_location(event.get_location().unwrap_or_default())
        .with_all_day(all_day);

    debug!(uid = %parsed.id, start = %parsed.start, "Parsed event from ICS");
    Some(parsed)
}

/// Converts an ICS timestamp to naive local time, flagging date-only values.
///
/// `TZID` timestamps keep their wall-clock value; the IANA zone is not resolved.
fn to_local(value: DatePerhapsTime) -> (NaiveDateTime, bool) {
    match value {
        DatePerhapsTime::Date(date) => (date.and_time(NaiveTime::MIN), true),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => {
            (dt.with_timezone(&Local).naive_local(), false)
        }
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => (naive, false),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, .. }) => {
            (date_time, false)
        }
    }
}

fn floating(dt: NaiveDateTime) -> DatePerhapsTime {
    DatePerhapsTime::DateTime(CalendarDateTime::Floating(dt))
}

/// Serializes a new VEVENT wrapped in a VCALENDAR.
pub fn build_calendar(uid: &str, event: &NewEvent) -> String {
    let mut vevent = Event::new();
    vevent
        .uid(uid)
        .summary(&event.title)
        .starts(floating(event.start))
        .ends(floating(event.end));
    if !event.description.is_empty() {
        vevent.description(&event.description);
    }
    if !event.location.is_empty() {
        vevent.location(&event.location);
    }

    Calendar::new().push(vevent.done()).done().to_string()
}

/// Applies `patch` to the VEVENT with `uid` inside an existing object.
///
/// Properties the patch does not name (attendees, alarms, RRULE) survive.
pub fn patch_calendar(ics: &str, uid: &str, patch: &EventPatch) -> BackendResult<String> {
    let mut calendar = ics.parse::<Calendar>().map_err(|e| {
        BackendError::invalid_response(format!("stored event is not valid iCalendar: {}", e))
    })?;

    let vevent = calendar
        .components
        .iter_mut()
        .find_map(|component| match component {
            CalendarComponent::Event(event) if event.get_uid() == Some(uid) => Some(event),
            _ => None,
        })
        .ok_or_else(|| BackendError::not_found(format!("Event not found: {}", uid)))?;

    if let Some(ref title) = patch.title {
        vevent.summary(title);
    }
    if let Some(start) = patch.start {
        vevent.starts(floating(start));
    }
    if let Some(end) = patch.end {
        vevent.ends(floating(end));
    }
    if let Some(ref description) = patch.description {
        vevent.description(description);
    }
    if let Some(ref location) = patch.location {
        vevent.location(location);
    }

    Ok(calendar.to_string())
}
