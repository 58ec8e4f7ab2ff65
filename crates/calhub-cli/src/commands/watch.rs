//! `calhub watch`: print each reminder once as a JSON line, optionally as a desktop popup.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use calhub_server::{AppContext, DesktopNotifier, Notification, NotifyConfig, Tools, WatchConfig, Watcher};
use tracing::{info, warn};

use crate::error::CliResult;
use crate::signals::shutdown_signal;

/// Builds the watcher settings from the command line.
pub fn watch_config(interval: u64, lookahead: Option<u32>, user_id: Option<i64>) -> WatchConfig {
    let config = WatchConfig::new(Duration::from_secs(interval)).with_user_id(user_id);
    match lookahead {
        Some(minutes) => config.with_lookahead(minutes),
        None => config,
    }
}

/// Desktop popup settings from `--icon` and `--popup-timeout`.
pub fn notify_config(icon: Option<String>, popup_timeout: Option<u32>) -> NotifyConfig {
    let mut config = NotifyConfig::default();
    if let Some(path) = icon {
        config = config.with_icon_path(path);
    }
    if let Some(secs) = popup_timeout {
        config = config.with_timeout(secs);
    }
    config
}

/// Polls until SIGINT or SIGTERM. Popups are shown when `popups` is set.
pub async fn run(
    ctx: Arc<AppContext>,
    user_id: Option<i64>,
    interval: u64,
    lookahead: Option<u32>,
    popups: Option<NotifyConfig>,
) -> CliResult<()> {
    let watcher = Watcher::new(Tools::new(ctx), watch_config(interval, lookahead, user_id));
    let notifier = popups.map(DesktopNotifier::new);

    watcher
        .run(
            |notification| {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = print_line(&mut stdout, notification) {
                    warn!(error = %e, "Failed to print notification");
                }
                if let Some(ref notifier) = notifier {
                    notifier.show(notification);
                }
            },
            shutdown_signal(),
        )
        .await;

    info!("Watch finished");
    Ok(())
}

fn print_line(out: &mut impl Write, notification: &Notification) -> CliResult<()> {
    serde_json::to_writer(&mut *out, notification)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calhub_server::{NotificationData, Urgency};

    #[test]
    fn config_from_flags() {
        let config = watch_config(30, Some(60), Some(42));
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.lookahead_minutes, Some(60));
        assert_eq!(config.user_id, Some(42));

        assert_eq!(watch_config(60, None, None).lookahead_minutes, None);
    }

    #[test]
    fn popup_settings_from_flags() {
        let config = notify_config(Some("/tmp/cal.png".into()), Some(4));
        assert_eq!(config.icon_path.as_deref(), Some("/tmp/cal.png"));
        assert_eq!(config.timeout_secs, 4);
        assert_eq!(config.app_name, "calhub");

        let defaults = notify_config(None, None);
        assert_eq!(defaults.icon_path, None);
        assert_eq!(defaults.timeout_secs, NotifyConfig::default().timeout_secs);
    }

    #[test]
    fn one_json_object_per_line() {
        let notification = Notification {
            event_type: "calendar.reminder_upcoming".into(),
            title: "Standup".into(),
            message: "Termin \"Standup\" beginnt in 5 Minuten (Arbeit)".into(),
            urgency: Urgency::Warning,
            dedup_key: "calendar:work:e1:5min".into(),
            data: NotificationData {
                calendar: "work".into(),
                label: "Arbeit".into(),
                event_id: "e1".into(),
                start: "2026-02-13T09:00:00".into(),
                location: String::new(),
                minutes_until: 5,
            },
            tts: true,
        };

        let mut out = Vec::new();
        print_line(&mut out, &notification).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["dedup_key"], "calendar:work:e1:5min");
        assert_eq!(value["urgency"], "warning");
        assert_eq!(value["tts"], true);
    }
}
