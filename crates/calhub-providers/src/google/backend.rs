//! Google Calendar backend.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tracing::info;

use calhub_core::{CalendarEvent, local_to_utc};

use crate::backend::{BackendKind, BoxFuture, CalendarBackend, EventPatch, NewEvent};
use crate::error::BackendResult;

use super::client::GoogleCalendarClient;
use super::config::{GoogleConfig, GoogleSettings, OAuthCredentials};
use super::tokens::TokenInfo;

struct Session {
    client: Arc<GoogleCalendarClient>,
    token: TokenInfo,
}

/// One Google calendar, authorized by a stored access token.
///
/// The token file is read on first use and again whenever the cached token
/// has expired, so a token renewed out of band is picked up.
pub struct GoogleBackend {
    account: String,
    config: GoogleConfig,
    session: Mutex<Option<Session>>,
}

impl GoogleBackend {
    pub fn new(account: impl Into<String>, settings: &GoogleSettings) -> Self {
        Self::with_config(account, GoogleConfig::from_settings(settings))
    }

    pub fn with_config(account: impl Into<String>, config: GoogleConfig) -> Self {
        Self {
            account: account.into(),
            config,
            session: Mutex::new(None),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    async fn client(&self) -> BackendResult<Arc<GoogleCalendarClient>> {
        let mut guard = self.session.lock().await;
        if let Some(ref session) = *guard {
            if !session.token.is_expired() {
                return Ok(Arc::clone(&session.client));
            }
        }

        OAuthCredentials::from_file(&self.config.credentials_file, &self.account)?;
        let token = TokenInfo::load(&self.config.token_file, &self.account)
            .map_err(|_| super::tokens::reauthenticate(&self.account))?
            .ensure_valid(&self.account)?;
        let client = Arc::new(GoogleCalendarClient::new(&self.config, token.token.clone())?);

        info!(
            account = %self.account,
            calendar_id = %self.config.calendar_id,
            "Google Calendar client ready"
        );
        *guard = Some(Session {
            client: Arc::clone(&client),
            token,
        });
        Ok(client)
    }

    async fn list(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> BackendResult<Vec<CalendarEvent>> {
        let client = self.client().await?;
        client
            .list_events(local_to_utc(start), local_to_utc(end), &self.account)
            .await
    }

    async fn create(&self, event: NewEvent) -> BackendResult<CalendarEvent> {
        let client = self.client().await?;
        let created = client.insert_event(&event, &self.account).await?;
        info!(account = %self.account, event_id = %created.id, "Created Google event");
        Ok(created)
    }

    async fn update(&self, event_id: &str, patch: EventPatch) -> BackendResult<CalendarEvent> {
        let client = self.client().await?;
        client.patch_event(event_id, &patch, &self.account).await
    }

    async fn delete(&self, event_id: &str) -> BackendResult<bool> {
        self.client().await?.delete_event(event_id).await
    }

    async fn get(&self, event_id: &str) -> BackendResult<CalendarEvent> {
        self.client().await?.get_event(event_id, &self.account).await
    }
}

impl CalendarBackend for GoogleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Google
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendErrorCode;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    struct Fixture {
        _credentials: NamedTempFile,
        _token: NamedTempFile,
        backend: GoogleBackend,
    }

    fn fixture(server: &MockServer) -> Fixture {
        let credentials = write_file(r#"{"installed": {"client_id": "id", "client_secret": "s"}}"#);
        let token = write_file(r#"{"token": "ya29.test", "expiry": "2099-01-01T00:00:00Z"}"#);
        let config = GoogleConfig::new(credentials.path())
            .with_token_file(token.path())
            .with_api_base(server.uri());
        Fixture {
            backend: GoogleBackend::with_config("privat", config),
            _credentials: credentials,
            _token: token,
        }
    }

    #[tokio::test]
    async fn lists_events_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .and(header("authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"id": "a", "summary": "Turnen", "start": {"date": "2026-02-14"}, "end": {"date": "2026-02-15"}},
                    {"id": "b", "status": "cancelled", "start": {"date": "2026-02-14"}}
                ]
            })))
            .mount(&server)
            .await;

        let fx = fixture(&server);
        let events = fx.backend.list_events(at(14, 0, 0), at(14, 23, 59)).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Turnen");
        assert_eq!(events[0].calendar, "privat");
        assert!(events[0].all_day);
    }

    #[tokio::test]
    async fn insert_sends_configured_timezone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(body_partial_json(serde_json::json!({
                "summary": "Zahnarzt",
                "start": {"dateTime": "2026-02-14T09:30:00", "timeZone": "Europe/Berlin"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "new-1",
                "summary": "Zahnarzt",
                "start": {"date": "2026-02-14"},
                "end": {"date": "2026-02-14"}
            })))
            .mount(&server)
            .await;

        let fx = fixture(&server);
        let created = fx
            .backend
            .create_event(NewEvent::new("Zahnarzt", at(14, 9, 30), at(14, 10, 0)))
            .await
            .unwrap();
        assert_eq!(created.id, "new-1");
    }

    #[tokio::test]
    async fn missing_events_map_to_not_found_and_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/events/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let fx = fixture(&server);
        let err = fx.backend.get_event("gone").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.message(), "Event not found: gone");

        assert!(!fx.backend.delete_event("gone").await.unwrap());
    }

    #[tokio::test]
    async fn expired_token_is_authentication_error() {
        let credentials = write_file(r#"{"client_id": "id", "client_secret": "s"}"#);
        let token = write_file(r#"{"token": "old", "expiry": "2020-01-01T00:00:00Z"}"#);
        let config = GoogleConfig::new(credentials.path()).with_token_file(token.path());
        let backend = GoogleBackend::with_config("privat", config);

        let err = backend.get_event("x").await.unwrap_err();
        assert_eq!(err.code(), BackendErrorCode::AuthenticationFailed);
        assert!(err.message().starts_with("Calendar 'privat': Google token not found or expired"));
    }

    #[tokio::test]
    async fn missing_credentials_file_is_configuration_error() {
        let config = GoogleConfig::new("/nonexistent/credentials.json");
        let backend = GoogleBackend::with_config("privat", config);

        let err = backend.list_events(at(14, 0, 0), at(15, 0, 0)).await.unwrap_err();
        assert_eq!(err.code(), BackendErrorCode::ConfigurationError);
        assert!(err.message().contains("credentials file not found"));
    }
}
