//! WebDAV/CalDAV request bodies and multistatus parsing.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};

use crate::error::BackendResult;
use crate::xml::{XmlBuilder, local_name};

pub const DAV_NS: &str = "DAV:";
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

/// A calendar collection found by PROPFIND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCalendar {
    pub href: String,
    pub display_name: Option<String>,
}

/// One calendar object resource from a REPORT response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavResource {
    pub href: String,
    pub etag: Option<String>,
    pub ics: String,
}

fn caldav_root(name: &str) -> BytesStart<'_> {
    let mut root = BytesStart::new(name);
    root.push_attribute(("xmlns:d", DAV_NS));
    root.push_attribute(("xmlns:c", CALDAV_NS));
    root
}

/// PROPFIND body asking for `displayname` and `resourcetype`.
pub fn propfind_calendars_body() -> BackendResult<String> {
    let mut xml = XmlBuilder::new();
    xml.open(caldav_root("d:propfind"))?;
    xml.open_tag("d:prop")?;
    xml.empty_tag("d:displayname")?;
    xml.empty_tag("d:resourcetype")?;
    xml.close("d:prop")?;
    xml.close("d:propfind")?;
    xml.finish()
}

/// Writes the requested properties. With `expand`, the server returns
/// recurring events as individual instances within that range.
fn write_query_prop(
    xml: &mut XmlBuilder,
    expand: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> BackendResult<()> {
    xml.open_tag("d:prop")?;
    xml.empty_tag("d:getetag")?;
    match expand {
        Some((start, end)) => {
            xml.open_tag("c:calendar-data")?;
            let mut element = BytesStart::new("c:expand");
            element.push_attribute(("start", format_utc(start).as_str()));
            element.push_attribute(("end", format_utc(end).as_str()));
            xml.empty(element)?;
            xml.close("c:calendar-data")?;
        }
        None => xml.empty_tag("c:calendar-data")?,
    }
    xml.close("d:prop")
}

fn open_comp_filter(xml: &mut XmlBuilder, component: &str) -> BackendResult<()> {
    let mut filter = BytesStart::new("c:comp-filter");
    filter.push_attribute(("name", component));
    xml.open(filter)
}

/// `calendar-query` REPORT for VEVENTs overlapping `[start, end)`, expanded.
pub fn calendar_query_body(start: DateTime<Utc>, end: DateTime<Utc>) -> BackendResult<String> {
    let mut xml = XmlBuilder::new();
    xml.open(caldav_root("c:calendar-query"))?;
    write_query_prop(&mut xml, Some((start, end)))?;
    xml.open_tag("c:filter")?;
    open_comp_filter(&mut xml, "VCALENDAR")?;
    open_comp_filter(&mut xml, "VEVENT")?;

    let mut range = BytesStart::new("c:time-range");
    range.push_attribute(("start", format_utc(start).as_str()));
    range.push_attribute(("end", format_utc(end).as_str()));
    xml.empty(range)?;

    xml.close("c:comp-filter")?;
    xml.close("c:comp-filter")?;
    xml.close("c:filter")?;
    xml.close("c:calendar-query")?;
    xml.finish()
}

/// `calendar-query` REPORT matching a single UID.
pub fn uid_query_body(uid: &str) -> BackendResult<String> {
    let mut xml = XmlBuilder::new();
    xml.open(caldav_root("c:calendar-query"))?;
    write_query_prop(&mut xml, None)?;
    xml.open_tag("c:filter")?;
    open_comp_filter(&mut xml, "VCALENDAR")?;
    open_comp_filter(&mut xml, "VEVENT")?;

    let mut prop = BytesStart::new("c:prop-filter");
    prop.push_attribute(("name", "UID"));
    xml.open(prop)?;
    let mut matcher = BytesStart::new("c:text-match");
    matcher.push_attribute(("collation", "i;octet"));
    xml.open(matcher)?;
    xml.text(uid)?;
    xml.close("c:text-match")?;
    xml.close("c:prop-filter")?;

    xml.close("c:comp-filter")?;
    xml.close("c:comp-filter")?;
    xml.close("c:filter")?;
    xml.close("c:calendar-query")?;
    xml.finish()
}

/// Extracts calendar collections from a PROPFIND multistatus.
pub fn parse_propfind_response(xml: &str) -> Vec<DiscoveredCalendar> {
    let mut calendars = Vec::new();
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut href: Option<String> = None;
    let mut display_name: Option<String> = None;
    let mut is_calendar = false;
    let mut current: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()).as_str() {
                "response" => {
                    href = None;
                    display_name = None;
                    is_calendar = false;
                }
                "calendar" => is_calendar = true,
                local @ ("href" | "displayname") => current = Some(local.to_string()),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == "calendar" {
                    is_calendar = true;
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                match current.as_deref() {
                    Some("href") => href = Some(text),
                    Some("displayname") => display_name = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()) == "response" && is_calendar {
                    if let Some(href) = href.take() {
                        calendars.push(DiscoveredCalendar {
                            href,
                            display_name: display_name.take(),
                        });
                    }
                }
                current = None;
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    calendars
}

/// Extracts `(href, etag, calendar-data)` triples from a REPORT multistatus.
pub fn parse_report_response(xml: &str) -> Vec<DavResource> {
    let mut resources = Vec::new();
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut href: Option<String> = None;
    let mut etag: Option<String> = None;
    let mut data: Option<String> = None;
    let mut current: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        let text = match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                match local_name(e.name().as_ref()).as_str() {
                    "response" => {
                        href = None;
                        etag = None;
                        data = None;
                    }
                    local @ ("href" | "getetag" | "calendar-data") => {
                        current = Some(local.to_string())
                    }
                    _ => {}
                }
                None
            }
            Ok(Event::Text(e)) => Some(e.unescape().unwrap_or_default().to_string()),
            Ok(Event::CData(e)) => Some(String::from_utf8_lossy(&e).to_string()),
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()) == "response" {
                    if let (Some(href), Some(ics)) = (href.take(), data.take()) {
                        resources.push(DavResource {
                            href,
                            etag: etag.take(),
                            ics,
                        });
                    }
                }
                current = None;
                None
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => None,
        };

        if let Some(text) = text {
            match current.as_deref() {
                Some("href") => href = Some(text),
                Some("getetag") => etag = Some(text.trim_matches('"').to_string()),
                Some("calendar-data") => data = Some(text),
                _ => {}
            }
        }
        buf.clear();
    }

    resources
}

/// Formats a timestamp for `time-range` filters.
fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}
