//! The tool surface.
//!
//! Each tool returns a JSON value: a structured result on success or
//! `{"error": "<message>"}` on failure. [`ToolCall`] is the serialized form
//! of a call so any transport can hand requests to [`Tools::dispatch`].

use std::sync::Arc;

use calhub_core::{
    CalendarEvent, ParsedTime, TimeWindow, end_of_day, format_iso, local_now, parse_datetime,
    start_of_day,
};
use calhub_providers::{EventPatch, NewEvent};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{Span, debug, info};

use crate::aggregator::{aggregate, bounded};
use crate::context::{AppContext, DEFAULT_LOOKAHEAD_MINUTES};
use crate::error::{ToolError, ToolResult};
use crate::notifications::{Notification, pending_notifications};
use crate::visibility::{resolve_account, visible_accounts};

/// Arguments of `list_events`. Empty strings mean "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListEventsArgs {
    /// Account name; empty lists every visible account.
    pub calendar: String,
    /// Defaults to today 00:00.
    pub start: String,
    /// Defaults to 23:59:59 on the start date. A date-only value means the end of that day.
    pub end: String,
    pub user_id: Option<i64>,
}

/// Arguments of `create_event`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEventArgs {
    pub calendar: String,
    pub title: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Arguments of `update_event`. Only non-empty fields are changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEventArgs {
    pub calendar: String,
    pub event_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Names one event, for `get_event` and `delete_event`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    pub calendar: String,
    pub event_id: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

fn default_lookahead() -> u32 {
    DEFAULT_LOOKAHEAD_MINUTES
}

/// A serialized tool invocation, e.g. `{"tool": "get_event", "calendar": "work", "event_id": "x"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolCall {
    ListCalendars {
        #[serde(default)]
        user_id: Option<i64>,
    },
    ListEvents(ListEventsArgs),
    CreateEvent(CreateEventArgs),
    UpdateEvent(UpdateEventArgs),
    DeleteEvent(EventRef),
    GetEvent(EventRef),
    GetPendingNotifications {
        #[serde(default = "default_lookahead")]
        lookahead_minutes: u32,
        #[serde(default)]
        user_id: Option<i64>,
    },
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListCalendars { .. } => "list_calendars",
            Self::ListEvents(_) => "list_events",
            Self::CreateEvent(_) => "create_event",
            Self::UpdateEvent(_) => "update_event",
            Self::DeleteEvent(_) => "delete_event",
            Self::GetEvent(_) => "get_event",
            Self::GetPendingNotifications { .. } => "get_pending_notifications",
        }
    }
}

/// The calendar tools, bound to one [`AppContext`].
#[derive(Debug, Clone)]
pub struct Tools {
    ctx: Arc<AppContext>,
}

impl Tools {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Routes a serialized call to its tool.
    #[tracing::instrument(skip(self, call), fields(tool = call.name(), duration_ms))]
    pub async fn dispatch(&self, call: ToolCall) -> Value {
        let start = std::time::Instant::now();

        let result = match call {
            ToolCall::ListCalendars { user_id } => {
                debug!(?user_id, "Handling list_calendars");
                self.list_calendars(user_id).await
            }
            ToolCall::ListEvents(args) => {
                debug!(calendar = %args.calendar, "Handling list_events");
                self.list_events(args).await
            }
            ToolCall::CreateEvent(args) => {
                debug!(calendar = %args.calendar, "Handling create_event");
                self.create_event(args).await
            }
            ToolCall::UpdateEvent(args) => {
                debug!(calendar = %args.calendar, event_id = %args.event_id, "Handling update_event");
                self.update_event(args).await
            }
            ToolCall::DeleteEvent(args) => {
                debug!(calendar = %args.calendar, event_id = %args.event_id, "Handling delete_event");
                self.delete_event(args).await
            }
            ToolCall::GetEvent(args) => {
                debug!(calendar = %args.calendar, event_id = %args.event_id, "Handling get_event");
                self.get_event(args).await
            }
            ToolCall::GetPendingNotifications {
                lookahead_minutes,
                user_id,
            } => {
                debug!(lookahead_minutes, ?user_id, "Handling get_pending_notifications");
                to_value(&self.get_pending_notifications(Some(lookahead_minutes), user_id).await)
            }
        };

        Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
        result
    }

    /// `{calendars: [{name, label, type}]}` for the accounts `user_id` may see.
    #[tracing::instrument(skip(self))]
    pub async fn list_calendars(&self, user_id: Option<i64>) -> Value {
        let accounts = visible_accounts(self.ctx.registry(), user_id);
        if accounts.is_empty() {
            return ToolError::NoCalendars.to_value();
        }
        let calendars: Vec<Value> = accounts
            .into_iter()
            .map(|a| json!({"name": a.name, "label": a.label, "type": a.kind.as_str()}))
            .collect();
        json!({ "calendars": calendars })
    }

    /// Merged events of one or all visible accounts.
    #[tracing::instrument(skip(self, args), fields(calendar = %args.calendar, user_id = ?args.user_id))]
    pub async fn list_events(&self, args: ListEventsArgs) -> Value {
        respond(self.try_list_events(args).await)
    }

    async fn try_list_events(&self, args: ListEventsArgs) -> ToolResult<Value> {
        let start = match optional_time("start", &args.start)? {
            Some(parsed) => parsed.value,
            None => start_of_day(local_now().date()),
        };
        let end = match optional_time("end", &args.end)? {
            Some(parsed) => parsed.as_range_end(),
            None => end_of_day(start.date()),
        };
        let window = TimeWindow::new(start, end);

        let registry = self.ctx.registry();
        let accounts = if args.calendar.is_empty() {
            visible_accounts(registry, args.user_id)
        } else {
            vec![resolve_account(registry, &args.calendar, args.user_id)?]
        };

        let result = aggregate(
            self.ctx.cache(),
            &accounts,
            window,
            self.ctx.config().backend_timeout,
        )
        .await;

        let names: Vec<&str> = accounts.iter().map(|a| a.name.as_str()).collect();
        let mut body = json!({
            "calendars_queried": names,
            "start": format_iso(&window.start),
            "end": format_iso(&window.end),
            "count": result.events.len(),
            "events": events_value(&result.events),
        });
        if !result.errors.is_empty() {
            body["errors"] = json!(result.errors);
        }
        Ok(body)
    }

    /// Creates an event and returns it as the backend stored it.
    #[tracing::instrument(skip(self, args), fields(calendar = %args.calendar, user_id = ?args.user_id))]
    pub async fn create_event(&self, args: CreateEventArgs) -> Value {
        respond(self.try_create_event(args).await)
    }

    async fn try_create_event(&self, args: CreateEventArgs) -> ToolResult<Value> {
        let account = resolve_account(self.ctx.registry(), &args.calendar, args.user_id)?;
        let start = required_time("start", &args.start)?;
        let end = required_time("end", &args.end)?;
        check_range(start, end)?;

        let new_event = NewEvent::new(args.title, start, end)
            .with_description(args.description)
            .with_location(args.location);

        let backend = self
            .ctx
            .backend_for(account)
            .await
            .map_err(|e| ToolError::backend("create", None, e))?;
        let event = bounded(self.ctx.config().backend_timeout, backend.create_event(new_event))
            .await
            .map_err(|e| ToolError::backend("create", None, e))?;

        info!(calendar = %account.name, event_id = %event.id, "Event created");
        Ok(json!({ "success": true, "event": event_value(&event) }))
    }

    /// Applies the non-empty fields of `args` to an existing event.
    #[tracing::instrument(skip(self, args), fields(calendar = %args.calendar, event_id = %args.event_id, user_id = ?args.user_id))]
    pub async fn update_event(&self, args: UpdateEventArgs) -> Value {
        respond(self.try_update_event(args).await)
    }

    async fn try_update_event(&self, args: UpdateEventArgs) -> ToolResult<Value> {
        let patch = EventPatch {
            title: non_empty(args.title),
            start: optional_time("start", &args.start)?.map(|parsed| parsed.value),
            end: optional_time("end", &args.end)?.map(|parsed| parsed.value),
            description: non_empty(args.description),
            location: non_empty(args.location),
        };
        if patch.is_empty() {
            return Err(ToolError::NoFieldsToUpdate);
        }

        let account = resolve_account(self.ctx.registry(), &args.calendar, args.user_id)?;
        let id = Some(args.event_id.as_str());
        let backend = self
            .ctx
            .backend_for(account)
            .await
            .map_err(|e| ToolError::backend("update", None, e))?;
        let timeout = self.ctx.config().backend_timeout;

        // A one-sided time change is checked against the stored other side.
        match (patch.start, patch.end) {
            (Some(start), Some(end)) => check_range(start, end)?,
            (None, None) => {}
            (start, end) => {
                let current = bounded(timeout, backend.get_event(&args.event_id))
                    .await
                    .map_err(|e| ToolError::backend("update", id, e))?;
                check_range(start.unwrap_or(current.start), end.unwrap_or(current.end))?;
            }
        }

        let event = bounded(timeout, backend.update_event(&args.event_id, patch))
            .await
            .map_err(|e| ToolError::backend("update", id, e))?;

        info!(calendar = %account.name, event_id = %event.id, "Event updated");
        Ok(json!({ "success": true, "event": event_value(&event) }))
    }

    /// Deletes an event; a missing event is an error.
    #[tracing::instrument(skip(self, args), fields(calendar = %args.calendar, event_id = %args.event_id, user_id = ?args.user_id))]
    pub async fn delete_event(&self, args: EventRef) -> Value {
        respond(self.try_delete_event(args).await)
    }

    async fn try_delete_event(&self, args: EventRef) -> ToolResult<Value> {
        let account = resolve_account(self.ctx.registry(), &args.calendar, args.user_id)?;
        let backend = self
            .ctx
            .backend_for(account)
            .await
            .map_err(|e| ToolError::backend("delete", None, e))?;
        let deleted = bounded(
            self.ctx.config().backend_timeout,
            backend.delete_event(&args.event_id),
        )
        .await
        .map_err(|e| ToolError::backend("delete", Some(args.event_id.as_str()), e))?;

        if !deleted {
            return Err(ToolError::event_not_found(args.event_id));
        }
        info!(calendar = %account.name, event_id = %args.event_id, "Event deleted");
        Ok(json!({
            "success": true,
            "message": format!("Event deleted from {}", account.name),
        }))
    }

    /// `{event}` with full details.
    #[tracing::instrument(skip(self, args), fields(calendar = %args.calendar, event_id = %args.event_id, user_id = ?args.user_id))]
    pub async fn get_event(&self, args: EventRef) -> Value {
        respond(self.try_get_event(args).await)
    }

    async fn try_get_event(&self, args: EventRef) -> ToolResult<Value> {
        let account = resolve_account(self.ctx.registry(), &args.calendar, args.user_id)?;
        let backend = self
            .ctx
            .backend_for(account)
            .await
            .map_err(|e| ToolError::backend("get", None, e))?;
        let event = bounded(
            self.ctx.config().backend_timeout,
            backend.get_event(&args.event_id),
        )
        .await
        .map_err(|e| ToolError::backend("get", Some(args.event_id.as_str()), e))?;

        Ok(json!({ "event": event_value(&event) }))
    }

    /// Reminders due now on the accounts `user_id` may see. Never an error.
    ///
    /// `lookahead_minutes` falls back to the context's default.
    #[tracing::instrument(skip(self))]
    pub async fn get_pending_notifications(
        &self,
        lookahead_minutes: Option<u32>,
        user_id: Option<i64>,
    ) -> Vec<Notification> {
        let config = self.ctx.config();
        let lookahead = lookahead_minutes.unwrap_or(config.default_lookahead_minutes);
        let accounts = visible_accounts(self.ctx.registry(), user_id);

        let notifications = pending_notifications(
            self.ctx.cache(),
            &accounts,
            local_now(),
            lookahead,
            config.backend_timeout,
        )
        .await;
        debug!(count = notifications.len(), "Pending notifications");
        notifications
    }
}

fn respond(result: ToolResult<Value>) -> Value {
    result.unwrap_or_else(|e| {
        debug!(error = %e, "Tool failed");
        e.to_value()
    })
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

fn event_value(event: &CalendarEvent) -> Value {
    to_value(event)
}

fn events_value(events: &[CalendarEvent]) -> Value {
    Value::Array(events.iter().map(event_value).collect())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn optional_time(field: &'static str, value: &str) -> ToolResult<Option<ParsedTime>> {
    if value.is_empty() {
        return Ok(None);
    }
    parse_datetime(value)
        .map(Some)
        .map_err(|_| ToolError::invalid_date(field, value))
}

fn check_range(start: NaiveDateTime, end: NaiveDateTime) -> ToolResult<()> {
    if end < start {
        return Err(ToolError::invalid_range(&start, &end));
    }
    Ok(())
}

fn required_time(field: &'static str, value: &str) -> ToolResult<NaiveDateTime> {
    parse_datetime(value)
        .map(|parsed| parsed.value)
        .map_err(|_| ToolError::invalid_date(field, value))
}
