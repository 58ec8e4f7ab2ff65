//! EWS SOAP envelopes and response parsing.

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use tracing::warn;

use calhub_core::{CalendarEvent, local_now, local_to_utc, to_local_naive};

use crate::backend::{EventPatch, NewEvent};
use crate::error::{BackendError, BackendResult};
use crate::xml::{XmlBuilder, local_name};

const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const TYPES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/types";
const MESSAGES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/messages";
const SERVER_VERSION: &str = "Exchange2013";

/// Response code EWS uses for ids that do not resolve to an item.
pub const ITEM_NOT_FOUND: &str = "ErrorItemNotFound";

/// A calendar item as returned by FindItem or GetItem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EwsItem {
    pub id: String,
    pub subject: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub location: Option<String>,
    pub body: Option<String>,
    pub all_day: bool,
}

impl EwsItem {
    pub fn into_event(self, account: &str) -> CalendarEvent {
        let start = self.start.as_deref().and_then(parse_time).unwrap_or_else(local_now);
        let end = self.end.as_deref().and_then(parse_time).unwrap_or(start);
        CalendarEvent::new(self.id, account, self.subject.unwrap_or_default(), start, end)
            .with_description(self.body.unwrap_or_default())
            .with_location(self.location.unwrap_or_default())
            .with_all_day(self.all_day)
    }
}

/// A failed response message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EwsFault {
    pub code: String,
    pub message: String,
}

impl EwsFault {
    pub fn is_not_found(&self) -> bool {
        self.code == ITEM_NOT_FOUND || self.code == "ErrorInvalidIdMalformed"
    }

    pub fn into_error(self) -> BackendError {
        if self.is_not_found() {
            return BackendError::not_found(self.message);
        }
        match self.code.as_str() {
            "ErrorAccessDenied" | "ErrorImpersonateUserDenied" => {
                BackendError::authorization(format!("{}: {}", self.code, self.message))
            }
            "ErrorServerBusy" => BackendError::rate_limited(self.message),
            _ => BackendError::calendar(format!("EWS {}: {}", self.code, self.message)),
        }
    }
}

/// Items and per-message failures of one EWS response.
#[derive(Debug, Default)]
pub struct EwsResponse {
    pub items: Vec<EwsItem>,
    pub faults: Vec<EwsFault>,
}

impl EwsResponse {
    /// Fails with the first fault when no item came back.
    pub fn into_items(self) -> BackendResult<Vec<EwsItem>> {
        match self.faults.into_iter().next() {
            Some(fault) if self.items.is_empty() => Err(fault.into_error()),
            _ => Ok(self.items),
        }
    }

    /// Fails with the first fault, if any.
    pub fn ensure_success(self) -> BackendResult<Self> {
        if let Some(fault) = self.faults.first() {
            return Err(fault.clone().into_error());
        }
        Ok(self)
    }
}

fn parse_time(value: &str) -> Option<NaiveDateTime> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Some(to_local_naive(&dt)),
        Err(e) => {
            warn!(value = %value, error = %e, "Failed to parse EWS timestamp");
            None
        }
    }
}

fn format_time(dt: &NaiveDateTime) -> String {
    format_utc(local_to_utc(*dt))
}

fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn envelope(body: impl FnOnce(&mut XmlBuilder) -> BackendResult<()>) -> BackendResult<String> {
    let mut xml = XmlBuilder::new();
    let mut root = BytesStart::new("soap:Envelope");
    root.push_attribute(("xmlns:soap", SOAP_NS));
    root.push_attribute(("xmlns:t", TYPES_NS));
    root.push_attribute(("xmlns:m", MESSAGES_NS));
    xml.open(root)?;

    xml.open_tag("soap:Header")?;
    let mut version = BytesStart::new("t:RequestServerVersion");
    version.push_attribute(("Version", SERVER_VERSION));
    xml.empty(version)?;
    xml.close("soap:Header")?;

    xml.open_tag("soap:Body")?;
    body(&mut xml)?;
    xml.close("soap:Body")?;
    xml.close("soap:Envelope")?;
    xml.finish()
}

fn calendar_folder(xml: &mut XmlBuilder, mailbox: &str) -> BackendResult<()> {
    let mut folder = BytesStart::new("t:DistinguishedFolderId");
    folder.push_attribute(("Id", "calendar"));
    xml.open(folder)?;
    xml.open_tag("t:Mailbox")?;
    xml.text_element("t:EmailAddress", mailbox)?;
    xml.close("t:Mailbox")?;
    xml.close("t:DistinguishedFolderId")
}

fn item_ids(xml: &mut XmlBuilder, ids: &[&str]) -> BackendResult<()> {
    xml.open_tag("m:ItemIds")?;
    for id in ids {
        let mut item = BytesStart::new("t:ItemId");
        item.push_attribute(("Id", *id));
        xml.empty(item)?;
    }
    xml.close("m:ItemIds")
}

/// FindItem over a CalendarView, so recurring series come back expanded.
pub fn find_items_body(
    mailbox: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> BackendResult<String> {
    envelope(|xml| {
        let mut find = BytesStart::new("m:FindItem");
        find.push_attribute(("Traversal", "Shallow"));
        xml.open(find)?;

        xml.open_tag("m:ItemShape")?;
        xml.text_element("t:BaseShape", "IdOnly")?;
        xml.open_tag("t:AdditionalProperties")?;
        for field in [
            "item:Subject",
            "calendar:Start",
            "calendar:End",
            "calendar:Location",
            "calendar:IsAllDayEvent",
        ] {
            let mut uri = BytesStart::new("t:FieldURI");
            uri.push_attribute(("FieldURI", field));
            xml.empty(uri)?;
        }
        xml.close("t:AdditionalProperties")?;
        xml.close("m:ItemShape")?;

        let mut view = BytesStart::new("m:CalendarView");
        view.push_attribute(("StartDate", format_time(&start).as_str()));
        view.push_attribute(("EndDate", format_time(&end).as_str()));
        xml.empty(view)?;

        xml.open_tag("m:ParentFolderIds")?;
        calendar_folder(xml, mailbox)?;
        xml.close("m:ParentFolderIds")?;
        xml.close("m:FindItem")
    })
}

/// GetItem with plain-text bodies.
pub fn get_items_body(ids: &[&str]) -> BackendResult<String> {
    envelope(|xml| {
        xml.open_tag("m:GetItem")?;
        xml.open_tag("m:ItemShape")?;
        xml.text_element("t:BaseShape", "AllProperties")?;
        xml.text_element("t:BodyType", "Text")?;
        xml.close("m:ItemShape")?;
        item_ids(xml, ids)?;
        xml.close("m:GetItem")
    })
}

pub fn create_item_body(mailbox: &str, event: &NewEvent) -> BackendResult<String> {
    envelope(|xml| {
        let mut create = BytesStart::new("m:CreateItem");
        create.push_attribute(("SendMeetingInvitations", "SendToNone"));
        xml.open(create)?;

        xml.open_tag("m:SavedItemFolderId")?;
        calendar_folder(xml, mailbox)?;
        xml.close("m:SavedItemFolderId")?;

        xml.open_tag("m:Items")?;
        xml.open_tag("t:CalendarItem")?;
        xml.text_element("t:Subject", &event.title)?;
        text_body(xml, &event.description)?;
        xml.text_element("t:Start", &format_time(&event.start))?;
        xml.text_element("t:End", &format_time(&event.end))?;
        xml.text_element("t:Location", &event.location)?;
        xml.close("t:CalendarItem")?;
        xml.close("m:Items")?;

        xml.close("m:CreateItem")
    })
}

fn text_body(xml: &mut XmlBuilder, text: &str) -> BackendResult<()> {
    let mut body = BytesStart::new("t:Body");
    body.push_attribute(("BodyType", "Text"));
    xml.open(body)?;
    xml.text(text)?;
    xml.close("t:Body")
}

/// One SetItemField per patched field, last writer wins.
pub fn update_item_body(id: &str, patch: &EventPatch) -> BackendResult<String> {
    envelope(|xml| {
        let mut update = BytesStart::new("m:UpdateItem");
        update.push_attribute(("ConflictResolution", "AlwaysOverwrite"));
        update.push_attribute(("SendMeetingInvitationsOrCancellations", "SendToNone"));
        xml.open(update)?;
        xml.open_tag("m:ItemChanges")?;
        xml.open_tag("t:ItemChange")?;

        let mut item_id = BytesStart::new("t:ItemId");
        item_id.push_attribute(("Id", id));
        xml.empty(item_id)?;

        xml.open_tag("t:Updates")?;
        if let Some(ref title) = patch.title {
            set_field(xml, "item:Subject", |xml| xml.text_element("t:Subject", title))?;
        }
        if let Some(ref description) = patch.description {
            set_field(xml, "item:Body", |xml| text_body(xml, description))?;
        }
        if let Some(ref start) = patch.start {
            set_field(xml, "calendar:Start", |xml| {
                xml.text_element("t:Start", &format_time(start))
            })?;
        }
        if let Some(ref end) = patch.end {
            set_field(xml, "calendar:End", |xml| {
                xml.text_element("t:End", &format_time(end))
            })?;
        }
        if let Some(ref location) = patch.location {
            set_field(xml, "calendar:Location", |xml| {
                xml.text_element("t:Location", location)
            })?;
        }
        xml.close("t:Updates")?;

        xml.close("t:ItemChange")?;
        xml.close("m:ItemChanges")?;
        xml.close("m:UpdateItem")
    })
}

fn set_field(
    xml: &mut XmlBuilder,
    field: &str,
    value: impl FnOnce(&mut XmlBuilder) -> BackendResult<()>,
) -> BackendResult<()> {
    xml.open_tag("t:SetItemField")?;
    let mut uri = BytesStart::new("t:FieldURI");
    uri.push_attribute(("FieldURI", field));
    xml.empty(uri)?;
    xml.open_tag("t:CalendarItem")?;
    value(xml)?;
    xml.close("t:CalendarItem")?;
    xml.close("t:SetItemField")
}

pub fn delete_item_body(id: &str) -> BackendResult<String> {
    envelope(|xml| {
        let mut delete = BytesStart::new("m:DeleteItem");
        delete.push_attribute(("DeleteType", "MoveToDeletedItems"));
        delete.push_attribute(("SendMeetingCancellations", "SendToNone"));
        xml.open(delete)?;
        item_ids(xml, &[id])?;
        xml.close("m:DeleteItem")
    })
}

/// Collects calendar items and failed response messages.
///
/// A SOAP fault is reported as one fault with code `soap:Fault`.
pub fn parse_response(xml: &str) -> EwsResponse {
    let mut response = EwsResponse::default();
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut item: Option<EwsItem> = None;
    let mut failed = false;
    let mut code: Option<String> = None;
    let mut message: Option<String> = None;
    let mut current: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                if name.ends_with("ResponseMessage") {
                    failed = e.attributes().flatten().any(|attr| {
                        attr.key.as_ref() == b"ResponseClass" && attr.value.as_ref() == b"Error"
                    });
                    code = None;
                    message = None;
                } else if name == "CalendarItem" {
                    item = Some(EwsItem::default());
                } else if name == "Fault" {
                    failed = true;
                    code = Some("soap:Fault".to_string());
                }
                current = Some(name);
            }
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == "ItemId" {
                    if let Some(ref mut item) = item {
                        if let Some(id) = e
                            .attributes()
                            .flatten()
                            .find(|attr| attr.key.as_ref() == b"Id")
                        {
                            item.id = String::from_utf8_lossy(&id.value).into_owned();
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().into_owned();
                match (current.as_deref(), item.as_mut()) {
                    (Some("ResponseCode"), _) => code = Some(text),
                    (Some("MessageText" | "faultstring"), _) => message = Some(text),
                    (Some("Subject"), Some(item)) => item.subject = Some(text),
                    (Some("Start"), Some(item)) => item.start = Some(text),
                    (Some("End"), Some(item)) => item.end = Some(text),
                    (Some("Location"), Some(item)) => item.location = Some(text),
                    (Some("Body"), Some(item)) => item.body = Some(text),
                    (Some("IsAllDayEvent"), Some(item)) => item.all_day = text == "true",
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "CalendarItem" {
                    if let Some(done) = item.take().filter(|i| !i.id.is_empty()) {
                        response.items.push(done);
                    }
                } else if (name.ends_with("ResponseMessage") || name == "Fault") && failed {
                    response.faults.push(EwsFault {
                        code: code.take().unwrap_or_else(|| "Unknown".to_string()),
                        message: message.take().unwrap_or_default(),
                    });
                    failed = false;
                }
                current = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                response.faults.push(EwsFault {
                    code: "InvalidXml".to_string(),
                    message: e.to_string(),
                });
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    response
}
