//! Google Calendar API client.
//!
//! Low-level HTTP access to the v3 `events` resource: request building,
//! status mapping and response parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use calhub_core::{CalendarEvent, ISO_FORMAT, start_of_day, to_local_naive};

use crate::backend::{EventPatch, NewEvent};
use crate::error::{BackendError, BackendResult};

use super::config::GoogleConfig;

const MAX_RESULTS: usize = 250;

/// Google Calendar API client for one calendar.
#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_base: String,
    calendar_id: String,
    timezone: String,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(config: &GoogleConfig, access_token: impl Into<String>) -> BackendResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| BackendError::network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_base: config.api_base.clone(),
            calendar_id: config.calendar_id.clone(),
            timezone: config.timezone.clone(),
            access_token: access_token.into(),
        })
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(&self.calendar_id)
        )
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), urlencoding::encode(event_id))
    }

    /// Lists expanded event instances between `time_min` and `time_max`.
    pub async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        account: &str,
    ) -> BackendResult<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(self.events_url())
                .query(&[
                    ("timeMin", time_min.to_rfc3339()),
                    ("timeMax", time_max.to_rfc3339()),
                    ("maxResults", MAX_RESULTS.to_string()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                ]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: EventListResponse = self.send_json(request).await?;
            events.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.into_event(account)),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(calendar = %self.calendar_id, count = events.len(), "Fetched Google events");
        Ok(events)
    }

    pub async fn get_event(&self, event_id: &str, account: &str) -> BackendResult<CalendarEvent> {
        let request = self.http_client.get(self.event_url(event_id));
        let item: ApiEvent = self.send_json(request).await.map_err(|e| not_found_as(e, event_id))?;
        item.into_event(account)
            .ok_or_else(|| event_not_found(event_id))
    }

    pub async fn insert_event(&self, event: &NewEvent, account: &str) -> BackendResult<CalendarEvent> {
        let body = json!({
            "summary": event.title,
            "description": event.description,
            "location": event.location,
            "start": self.event_time(&event.start),
            "end": self.event_time(&event.end),
        });
        let request = self.http_client.post(self.events_url()).json(&body);
        let item: ApiEvent = self.send_json(request).await?;
        item.into_event(account)
            .ok_or_else(|| BackendError::invalid_response("created event has no id or start"))
    }

    /// Sends only the fields set in `patch`.
    pub async fn patch_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
        account: &str,
    ) -> BackendResult<CalendarEvent> {
        let mut body = Map::new();
        if let Some(ref title) = patch.title {
            body.insert("summary".into(), Value::from(title.as_str()));
        }
        if let Some(ref start) = patch.start {
            body.insert("start".into(), self.event_time(start));
        }
        if let Some(ref end) = patch.end {
            body.insert("end".into(), self.event_time(end));
        }
        if let Some(ref description) = patch.description {
            body.insert("description".into(), Value::from(description.as_str()));
        }
        if let Some(ref location) = patch.location {
            body.insert("location".into(), Value::from(location.as_str()));
        }

        let request = self
            .http_client
            .patch(self.event_url(event_id))
            .json(&Value::Object(body));
        let item: ApiEvent = self.send_json(request).await.map_err(|e| not_found_as(e, event_id))?;
        item.into_event(account)
            .ok_or_else(|| event_not_found(event_id))
    }

    /// Returns `false` when the event does not exist.
    pub async fn delete_event(&self, event_id: &str) -> BackendResult<bool> {
        let request = self.http_client.delete(self.event_url(event_id));
        match self.send(request).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn event_time(&self, dt: &NaiveDateTime) -> Value {
        json!({
            "dateTime": dt.format(ISO_FORMAT).to_string(),
            "timeZone": self.timezone,
        })
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::timeout("request timeout")
                } else if e.is_connect() {
                    BackendError::network(format!("connection failed: {}", e))
                } else {
                    BackendError::network(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(BackendError::authentication(
                "access token expired or invalid",
            )),
            StatusCode::FORBIDDEN => Err(BackendError::authorization("access denied to calendar")),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(BackendError::not_found("resource not found"))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                Err(BackendError::rate_limited(format!(
                    "rate limit exceeded{}",
                    retry_after
                        .map(|s| format!(", retry after {} seconds", s))
                        .unwrap_or_default()
                )))
            }
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(BackendError::bad_request(format!("API rejected request: {}", body)))
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(BackendError::server(format!("API error ({}): {}", s, body)))
            }
        }
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> BackendResult<T> {
        let body = self
            .send(request)
            .await?
            .text()
            .await
            .map_err(|e| BackendError::network(format!("failed to read response: {}", e)))?;

        serde_json::from_str(&body).map_err(|e| {
            BackendError::invalid_response(format!("failed to parse response: {}", e))
        })
    }
}

fn event_not_found(event_id: &str) -> BackendError {
    BackendError::not_found(format!("Event not found: {}", event_id))
}

fn not_found_as(error: BackendError, event_id: &str) -> BackendError {
    if error.is_not_found() {
        event_not_found(event_id)
    } else {
        error
    }
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

/// A single event from the API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    #[serde(default)]
    start: ApiEventTime,
    #[serde(default)]
    end: ApiEventTime,
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}

impl ApiEventTime {
    /// Local naive time and whether the value was date-only.
    fn to_local(&self) -> Option<(NaiveDateTime, bool)> {
        if let Some(ref dt) = self.date_time {
            return match DateTime::parse_from_rfc3339(dt) {
                Ok(parsed) => Some((to_local_naive(&parsed), false)),
                Err(e) => {
                    warn!(value = %dt, error = %e, "Failed to parse event time");
                    None
                }
            };
        }
        let date = self.date.as_deref()?;
        match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(parsed) => Some((start_of_day(parsed), true)),
            Err(e) => {
                warn!(value = %date, error = %e, "Failed to parse event date");
                None
            }
        }
    }
}

impl ApiEvent {
    fn into_event(self, account: &str) -> Option<CalendarEvent> {
        if self.status.as_deref() == Some("cancelled") {
            return None;
        }
        let id = self.id?;
        let Some((start, all_day)) = self.start.to_local() else {
            warn!(event_id = %id, "Event has no usable start time");
            return None;
        };
        let end = self.end.to_local().map(|(end, _)| end).unwrap_or(start);

        Some(
            CalendarEvent::new(id, account, self.summary.unwrap_or_default(), start, end)
                .with_description(self.description.unwrap_or_default())
                .with_location(self.location.unwrap_or_default())
                .with_all_day(all_day),
        )
    }
}
