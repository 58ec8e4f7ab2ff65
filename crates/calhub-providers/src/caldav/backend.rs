//! CalDAV calendar backend.

use chrono::NaiveDateTime;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info};
use url::Url;

use calhub_core::{CalendarEvent, local_to_utc};

use crate::backend::{BackendKind, BoxFuture, CalendarBackend, EventPatch, NewEvent};
use crate::credentials::EnvCredentials;
use crate::error::{BackendError, BackendResult};

use super::client::CalDavClient;
use super::config::{CalDavConfig, CalDavSettings};
use super::ics::{build_calendar, parse_events, patch_calendar};
use super::xml::{
    DavResource, calendar_query_body, parse_propfind_response, parse_report_response,
    propfind_calendars_body, uid_query_body,
};

/// Connected state, built on first use.
struct Session {
    client: CalDavClient,
    calendar_url: Url,
}

/// One CalDAV calendar collection.
///
/// Credentials are read from the environment when the first operation runs,
/// so a registry with unset variables still loads.
pub struct CalDavBackend {
    account: String,
    config: CalDavConfig,
    credentials: Option<EnvCredentials>,
    session: Mutex<Option<Session>>,
}

impl CalDavBackend {
    pub fn new(account: impl Into<String>, settings: &CalDavSettings) -> BackendResult<Self> {
        Ok(Self {
            account: account.into(),
            config: CalDavConfig::from_settings(settings)?,
            credentials: Some(settings.credentials.clone()),
            session: Mutex::new(None),
        })
    }

    /// Uses a fully resolved config; nothing is read from the environment.
    pub fn with_config(account: impl Into<String>, config: CalDavConfig) -> Self {
        Self {
            account: account.into(),
            config,
            credentials: None,
            session: Mutex::new(None),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    async fn session(&self) -> BackendResult<MappedMutexGuard<'_, Session>> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        MutexGuard::try_map(guard, Option::as_mut)
            .map_err(|_| BackendError::internal("CalDAV session unavailable"))
    }

    async fn connect(&self) -> BackendResult<Session> {
        let mut config = self.config.clone();
        if let Some(ref credentials) = self.credentials {
            let (username, password) = credentials.resolve(&self.account, "CalDAV")?;
            config = config.with_credentials(username, password);
        }

        let mut client = CalDavClient::new(config)?;
        let calendar_url = match self.config.calendar_name {
            Some(ref name) => self.discover(&mut client, name).await?,
            None => self.config.url.clone(),
        };

        info!(account = %self.account, calendar = %calendar_url, "Connected to CalDAV");
        Ok(Session {
            client,
            calendar_url,
        })
    }

    /// Finds the collection whose display name is `name`.
    async fn discover(&self, client: &mut CalDavClient, name: &str) -> BackendResult<Url> {
        let base = &self.config.url;
        debug!(account = %self.account, url = %base, "Discovering calendars via PROPFIND");

        let response = client
            .propfind(base.as_str(), &propfind_calendars_body()?, 1)
            .await?;
        let calendars = parse_propfind_response(&response);

        if let Some(found) = calendars
            .iter()
            .find(|c| c.display_name.as_deref() == Some(name))
        {
            return resolve_href(base, &found.href);
        }

        let available: Vec<&str> = calendars
            .iter()
            .map(|c| c.display_name.as_deref().unwrap_or(c.href.as_str()))
            .collect();
        Err(BackendError::calendar(format!(
            "Calendar '{}': CalDAV calendar '{}' not found. Available: [{}]",
            self.account,
            name,
            available.join(", ")
        )))
    }

    /// Finds the stored object holding the event with `uid`.
    async fn find_resource(
        &self,
        session: &mut Session,
        uid: &str,
    ) -> BackendResult<Option<DavResource>> {
        let response = session
            .client
            .report(session.calendar_url.as_str(), &uid_query_body(uid)?)
            .await?;

        Ok(parse_report_response(&response).into_iter().find(|resource| {
            parse_events(&resource.ics, &self.account)
                .iter()
                .any(|event| event.id == uid)
        }))
    }

    fn event_from(&self, ics: &str, uid: &str) -> BackendResult<CalendarEvent> {
        parse_events(ics, &self.account)
            .into_iter()
            .find(|event| event.id == uid)
            .ok_or_else(|| not_found(uid))
    }

    async fn list(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> BackendResult<Vec<CalendarEvent>> {
        let mut guard = self.session().await?;
        let session = &mut *guard;
        let body = calendar_query_body(local_to_utc(start), local_to_utc(end))?;
        let response = session
            .client
            .report(session.calendar_url.as_str(), &body)
            .await?;

        let mut events: Vec<CalendarEvent> = parse_report_response(&response)
            .iter()
            .flat_map(|resource| parse_events(&resource.ics, &self.account))
            .collect();
        events.sort_by_key(|event| event.start);

        debug!(account = %self.account, count = events.len(), "Fetched CalDAV events");
        Ok(events)
    }

    async fn create(&self, event: NewEvent) -> BackendResult<CalendarEvent> {
        let mut guard = self.session().await?;
        let session = &mut *guard;
        let uid = uuid::Uuid::new_v4().to_string();
        let url = resolve_href(&session.calendar_url, &format!("{}.ics", uid))?;

        session
            .client
            .put(url.as_str(), &build_calendar(&uid, &event), None)
            .await?;

        info!(account = %self.account, uid = %uid, "Created CalDAV event");
        Ok(event.into_event(uid, self.account.as_str()))
    }

    async fn update(&self, uid: &str, patch: EventPatch) -> BackendResult<CalendarEvent> {
        let mut guard = self.session().await?;
        let session = &mut *guard;
        let resource = self
            .find_resource(session, uid)
            .await?
            .ok_or_else(|| not_found(uid))?;

        let ics = patch_calendar(&resource.ics, uid, &patch)?;
        let url = resolve_href(&session.calendar_url, &resource.href)?;
        session
            .client
            .put(url.as_str(), &ics, resource.etag.as_deref())
            .await?;

        info!(account = %self.account, uid = %uid, "Updated CalDAV event");
        self.event_from(&ics, uid)
    }

    async fn delete(&self, uid: &str) -> BackendResult<bool> {
        let mut guard = self.session().await?;
        let session = &mut *guard;
        let Some(resource) = self.find_resource(session, uid).await? else {
            return Ok(false);
        };

        let url = resolve_href(&session.calendar_url, &resource.href)?;
        match session
            .client
            .delete(url.as_str(), resource.etag.as_deref())
            .await
        {
            Ok(()) => {
                info!(account = %self.account, uid = %uid, "Deleted CalDAV event");
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get(&self, uid: &str) -> BackendResult<CalendarEvent> {
        let mut guard = self.session().await?;
        let session = &mut *guard;
        let resource = self
            .find_resource(session, uid)
            .await?
            .ok_or_else(|| not_found(uid))?;
        self.event_from(&resource.ics, uid)
    }
}

impl CalendarBackend for CalDavBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Caldav
    }

    fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> BoxFuture<'_, BackendResult<Vec<CalendarEvent>>> {
        Box::pin(self.list(start, end))
    }

    fn create_event(&self, event: NewEvent) -> BoxFuture<'_, BackendResult<CalendarEvent>> {
        Box::pin(self.create(event))
    }

    fn update_event<'a>(
        &'a self,
        event_id: &'a str,
        patch: EventPatch,
    ) -> BoxFuture<'a, BackendResult<CalendarEvent>> {
        Box::pin(self.update(event_id, patch))
    }

    fn delete_event<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, BackendResult<bool>> {
        Box::pin(self.delete(event_id))
    }

    fn get_event<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, BackendResult<CalendarEvent>> {
        Box::pin(self.get(event_id))
    }
}

fn not_found(uid: &str) -> BackendError {
    BackendError::not_found(format!("Event not found: {}", uid))
}

/// Resolves a server href against the collection URL.
fn resolve_href(base: &Url, href: &str) -> BackendResult<Url> {
    base.join(href).map_err(|e| {
        BackendError::invalid_response(format!("invalid href '{}': {}", href, e)).with_source(e)
    })
}
