//! Periodic notification polling.
//!
//! The watcher calls `get_pending_notifications` on a fixed interval and
//! hands every reminder whose dedup key it has not seen to a delivery
//! callback. With the default one-minute interval each threshold is hit once.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use crate::notifications::Notification;
use crate::notify::{SharedNotifyState, new_notify_state};
use crate::tools::Tools;

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Time between scans.
    pub interval: Duration,
    /// Lookahead per scan; `None` uses the context default.
    pub lookahead_minutes: Option<u32>,
    /// Requester identity for visibility; `None` sees every calendar.
    pub user_id: Option<i64>,
    /// Delivered keys kept before the set is reset.
    pub max_sent_keys: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            lookahead_minutes: None,
            user_id: None,
            max_sent_keys: 1000,
        }
    }
}

impl WatchConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Builder: set lookahead.
    pub fn with_lookahead(mut self, minutes: u32) -> Self {
        self.lookahead_minutes = Some(minutes);
        self
    }

    /// Builder: scan on behalf of `user_id`.
    pub fn with_user_id(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Polls for reminders and delivers each one once.
pub struct Watcher {
    tools: Tools,
    config: WatchConfig,
    state: SharedNotifyState,
}

impl Watcher {
    pub fn new(tools: Tools, config: WatchConfig) -> Self {
        Self {
            tools,
            config,
            state: new_notify_state(),
        }
    }

    /// Returns the shared dedup state.
    pub fn state(&self) -> SharedNotifyState {
        self.state.clone()
    }

    /// Runs one scan and returns the reminders not delivered before.
    pub async fn poll(&self) -> Vec<Notification> {
        let pending = self
            .tools
            .get_pending_notifications(self.config.lookahead_minutes, self.config.user_id)
            .await;

        let mut state = self.state.write().await;
        state.cleanup_old_keys(self.config.max_sent_keys);
        let fresh = state.take_new(pending);
        debug!(new = fresh.len(), delivered_total = state.len(), "Notification poll");
        fresh
    }

    /// Polls until `shutdown` completes, passing new reminders to `deliver`.
    pub async fn run<F, S>(self, mut deliver: F, shutdown: S)
    where
        F: FnMut(&Notification),
        S: Future<Output = ()>,
    {
        info!(
            interval_secs = self.config.interval.as_secs(),
            user_id = ?self.config.user_id,
            "Watcher started"
        );
        tokio::pin!(shutdown);

        loop {
            for notification in self.poll().await {
                deliver(&notification);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = &mut shutdown => {
                    info!("Watcher stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppContext;
    use crate::registry::{AccountRegistry, CalendarAccount};
    use crate::testing::{MockBackend, MockFactory};
    use calhub_core::{CalendarEvent, local_now};
    use calhub_providers::BackendKind;
    use std::sync::Arc;

    fn tools_with_event_in(minutes: i64) -> Tools {
        let start = local_now() + chrono::Duration::minutes(minutes);
        let event = CalendarEvent::new("e1", "work", "Standup", start, start + chrono::Duration::minutes(15));
        let registry =
            AccountRegistry::new(vec![CalendarAccount::new("work", BackendKind::Ews)]).unwrap();
        let factory = MockFactory::new().with_backend("work", MockBackend::with_events(vec![event]));
        Tools::new(Arc::new(AppContext::with_factory(registry, Arc::new(factory))))
    }

    #[tokio::test]
    async fn repeated_polls_deliver_once() {
        let watcher = Watcher::new(tools_with_event_in(5), WatchConfig::default());

        let first = watcher.poll().await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].dedup_key, "calendar:work:e1:5min");

        assert!(watcher.poll().await.is_empty());
        assert!(watcher.state().read().await.was_sent("calendar:work:e1:5min"));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let watcher = Watcher::new(
            tools_with_event_in(30),
            WatchConfig::new(Duration::from_millis(10)).with_lookahead(45),
        );
        let mut delivered = Vec::new();

        watcher
            .run(
                |n| delivered.push(n.dedup_key.clone()),
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await;

        assert_eq!(delivered, vec!["calendar:work:e1:30min".to_string()]);
    }
}
