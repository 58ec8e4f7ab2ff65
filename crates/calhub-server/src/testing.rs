//! In-memory backends for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use calhub_core::{CalendarEvent, TimeWindow};
use calhub_providers::{
    BackendError, BackendKind, BackendResult, BoxFuture, CalendarBackend, EventPatch, NewEvent,
};
use chrono::NaiveDateTime;

use crate::factory::BackendFactory;
use crate::registry::CalendarAccount;

/// A backend holding its events in memory.
pub struct MockBackend {
    events: Mutex<Vec<CalendarEvent>>,
    list_error: Option<String>,
    delay: Option<Duration>,
    next_id: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            list_error: None,
            delay: None,
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        let backend = Self::new();
        *backend.events.lock().unwrap() = events;
        backend
    }

    /// Makes `list_events` fail with a network error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            list_error: Some(message.into()),
            ..Self::new()
        }
    }

    /// Makes `list_events` sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        self.events.lock().unwrap().clone()
    }

    fn find(&self, event_id: &str) -> BackendResult<CalendarEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|event| event.id == event_id)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("Event not found: {}", event_id)))
    }
}

impl CalendarBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Caldav
    }

    fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> BoxFuture<'_, BackendResult<Vec<CalendarEvent>>> {
        let window = TimeWindow::new(start, end);
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(ref message) = self.list_error {
                return Err(BackendError::network(message.clone()));
            }
            Ok(self
                .events()
                .into_iter()
                .filter(|event| window.overlaps(event.start, event.end))
                .collect())
        })
    }

    fn create_event(&self, event: NewEvent) -> BoxFuture<'_, BackendResult<CalendarEvent>> {
        Box::pin(async move {
            let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            let created = event.into_event(id, "mock");
            self.events.lock().unwrap().push(created.clone());
            Ok(created)
        })
    }

    fn update_event<'a>(
        &'a self,
        event_id: &'a str,
        patch: EventPatch,
    ) -> BoxFuture<'a, BackendResult<CalendarEvent>> {
        Box::pin(async move {
            let mut events = self.events.lock().unwrap();
            let event = events
                .iter_mut()
                .find(|event| event.id == event_id)
                .ok_or_else(|| BackendError::not_found(format!("Event not found: {}", event_id)))?;
            patch.apply_to(event);
            Ok(event.clone())
        })
    }

    fn delete_event<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, BackendResult<bool>> {
        Box::pin(async move {
            let mut events = self.events.lock().unwrap();
            let before = events.len();
            events.retain(|event| event.id != event_id);
            Ok(events.len() != before)
        })
    }

    fn get_event<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, BackendResult<CalendarEvent>> {
        Box::pin(async move { self.find(event_id) })
    }
}

/// Hands out preset backends by account name.
///
/// Accounts without a preset backend fail construction.
pub struct MockFactory {
    backends: HashMap<String, Arc<dyn CalendarBackend>>,
    builds: AtomicUsize,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn with_backend(self, name: &str, backend: impl CalendarBackend + 'static) -> Self {
        self.with_shared(name, Arc::new(backend))
    }

    pub fn with_shared(mut self, name: &str, backend: Arc<dyn CalendarBackend>) -> Self {
        self.backends.insert(name.to_string(), backend);
        self
    }

    /// Number of construction attempts.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl BackendFactory for MockFactory {
    fn create(&self, account: &CalendarAccount) -> BackendResult<Arc<dyn CalendarBackend>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.backends.get(&account.name).cloned().ok_or_else(|| {
            BackendError::configuration(format!("Calendar '{}': no backend", account.name))
        })
    }
}
