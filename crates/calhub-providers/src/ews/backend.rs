//! Exchange (EWS) calendar backend.

use chrono::NaiveDateTime;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use calhub_core::CalendarEvent;

use crate::backend::{BackendKind, BoxFuture, CalendarBackend, EventPatch, NewEvent};
use crate::credentials::EnvCredentials;
use crate::error::{BackendError, BackendResult};

use super::client::EwsClient;
use super::config::{EwsConfig, EwsSettings};
use super::soap::{
    EwsItem, create_item_body, delete_item_body, find_items_body, get_items_body,
    update_item_body,
};

/// The default calendar folder of one Exchange mailbox.
pub struct EwsBackend {
    account: String,
    config: EwsConfig,
    credentials: EnvCredentials,
    client: OnceCell<EwsClient>,
}

impl EwsBackend {
    pub fn new(account: impl Into<String>, settings: &EwsSettings) -> BackendResult<Self> {
        Ok(Self::with_config(
            account,
            EwsConfig::from_settings(settings)?,
            settings.credentials.clone(),
        ))
    }

    pub fn with_config(
        account: impl Into<String>,
        config: EwsConfig,
        credentials: EnvCredentials,
    ) -> Self {
        Self {
            account: account.into(),
            config,
            credentials,
            client: OnceCell::new(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    async fn client(&self) -> BackendResult<&EwsClient> {
        self.client
            .get_or_try_init(|| async {
                let (username, password) = self.credentials.resolve(&self.account, "EWS")?;
                let client = EwsClient::new(&self.config, username, password)?;
                info!(account = %self.account, url = %self.config.url, "EWS connected");
                Ok::<_, BackendError>(client)
            })
            .await
    }

    fn mailbox<'a>(&'a self, client: &'a EwsClient) -> &'a str {
        self.config.mailbox(client.username())
    }

    async fn fetch_items(&self, client: &EwsClient, ids: &[&str]) -> BackendResult<Vec<EwsItem>> {
        client.call(get_items_body(ids)?).await?.into_items()
    }

    async fn list(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> BackendResult<Vec<CalendarEvent>> {
        let client = self.client().await?;
        let found = client
            .call(find_items_body(self.mailbox(client), start, end)?)
            .await?
            .into_items()?;

        // FindItem cannot return bodies
        let items = if found.is_empty() {
            found
        } else {
            let ids: Vec<&str> = found.iter().map(|item| item.id.as_str()).collect();
            match self.fetch_items(client, &ids).await {
                Ok(full) => full,
                Err(e) => {
                    warn!(account = %self.account, error = %e, "GetItem failed, listing without bodies");
                    found
                }
            }
        };

        let mut events: Vec<CalendarEvent> = items
            .into_iter()
            .map(|item| item.into_event(&self.account))
            .collect();
        events.sort_by_key(|event| event.start);

        debug!(account = %self.account, count = events.len(), "Fetched EWS events");
        Ok(events)
    }

    async fn create(&self, event: NewEvent) -> BackendResult<CalendarEvent> {
        let client = self.client().await?;
        let created = client
            .call(create_item_body(self.mailbox(client), &event)?)
            .await?
            .into_items()?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::invalid_response("CreateItem returned no item id"))?;

        info!(account = %self.account, title = %event.title, "Created EWS event");
        Ok(event.into_event(created.id, self.account.as_str()))
    }

    async fn update(&self, event_id: &str, patch: EventPatch) -> BackendResult<CalendarEvent> {
        let client = self.client().await?;
        client
            .call(update_item_body(event_id, &patch)?)
            .await?
            .ensure_success()
            .map_err(|e| not_found_as(e, event_id))?;

        info!(account = %self.account, event_id = %event_id, "Updated EWS event");
        self.get(event_id).await
    }

    async fn delete(&self, event_id: &str) -> BackendResult<bool> {
        let client = self.client().await?;
        match client.call(delete_item_body(event_id)?).await?.ensure_success() {
            Ok(_) => {
                info!(account = %self.account, event_id = %event_id, "Deleted EWS event");
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get(&self, event_id: &str) -> BackendResult<CalendarEvent> {
        let client = self.client().await?;
        self.fetch_items(client, &[event_id])
            .await
            .map_err(|e| not_found_as(e, event_id))?
            .into_iter()
            .next()
            .map(|item| item.into_event(&self.account))
            .ok_or_else(|| event_not_found(event_id))
    }
}

impl CalendarBackend for EwsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ews
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
