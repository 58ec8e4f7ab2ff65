//! Tool subcommands: map the command line to a [`ToolCall`] and print its JSON result.

use std::sync::Arc;

use calhub_server::{
    AppContext, CreateEventArgs, EventRef, ListEventsArgs, ToolCall, Tools, UpdateEventArgs,
};
use serde_json::Value;

use crate::cli::Command;
use crate::error::{CliError, CliResult};

/// Builds the tool call for a tool subcommand.
///
/// `--user-id` applies to every call; for `call` it only fills a missing id.
pub fn to_call(command: Command, user_id: Option<i64>) -> CliResult<ToolCall> {
    let call = match command {
        Command::Calendars => ToolCall::ListCalendars { user_id },
        Command::Events {
            calendar,
            start,
            end,
        } => ToolCall::ListEvents(ListEventsArgs {
            calendar,
            start,
            end,
            user_id,
        }),
        Command::Create {
            calendar,
            title,
            start,
            end,
            description,
            location,
        } => ToolCall::CreateEvent(CreateEventArgs {
            calendar,
            title,
            start,
            end,
            description,
            location,
            user_id,
        }),
        Command::Update {
            calendar,
            event_id,
            title,
            start,
            end,
            description,
            location,
        } => ToolCall::UpdateEvent(UpdateEventArgs {
            calendar,
            event_id,
            title,
            start,
            end,
            description,
            location,
            user_id,
        }),
        Command::Delete { calendar, event_id } => ToolCall::DeleteEvent(EventRef {
            calendar,
            event_id,
            user_id,
        }),
        Command::Get { calendar, event_id } => ToolCall::GetEvent(EventRef {
            calendar,
            event_id,
            user_id,
        }),
        Command::Notifications { lookahead } => ToolCall::GetPendingNotifications {
            lookahead_minutes: lookahead,
            user_id,
        },
        Command::Call { json } => {
            let call: ToolCall = serde_json::from_str(&json)?;
            with_default_user(call, user_id)
        }
        Command::Check | Command::Watch { .. } => {
            return Err(CliError::Tool("not a tool command".to_string()));
        }
        #[cfg(feature = "google")]
        Command::Auth { .. } => {
            return Err(CliError::Tool("not a tool command".to_string()));
        }
    };
    Ok(call)
}

fn with_default_user(mut call: ToolCall, default: Option<i64>) -> ToolCall {
    let slot = match &mut call {
        ToolCall::ListCalendars { user_id } | ToolCall::GetPendingNotifications { user_id, .. } => {
            user_id
        }
        ToolCall::ListEvents(args) => &mut args.user_id,
        ToolCall::CreateEvent(args) => &mut args.user_id,
        ToolCall::UpdateEvent(args) => &mut args.user_id,
        ToolCall::DeleteEvent(args) | ToolCall::GetEvent(args) => &mut args.user_id,
    };
    if slot.is_none() {
        *slot = default;
    }
    call
}

/// Dispatches `call`, prints the result and turns `{"error": ..}` into a failure.
pub async fn run(ctx: Arc<AppContext>, call: ToolCall) -> CliResult<()> {
    let result = Tools::new(ctx).dispatch(call).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    check_result(&result)
}

fn check_result(result: &Value) -> CliResult<()> {
    match result.get("error").and_then(Value::as_str) {
        Some(message) => Err(CliError::Tool(message.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calhub_server::AccountRegistry;
    use serde_json::json;

    #[test]
    fn user_id_flows_into_args() {
        let call = to_call(
            Command::Get {
                calendar: "work".into(),
                event_id: "e1".into(),
            },
            Some(7),
        )
        .unwrap();
        assert_eq!(
            call,
            ToolCall::GetEvent(EventRef {
                calendar: "work".into(),
                event_id: "e1".into(),
                user_id: Some(7),
            })
        );
    }

    #[test]
    fn raw_call_keeps_its_own_user() {
        let own = to_call(
            Command::Call {
                json: r#"{"tool": "list_calendars", "user_id": 1}"#.into(),
            },
            Some(2),
        )
        .unwrap();
        assert_eq!(own, ToolCall::ListCalendars { user_id: Some(1) });

        let filled = to_call(
            Command::Call {
                json: r#"{"tool": "get_pending_notifications"}"#.into(),
            },
            Some(2),
        )
        .unwrap();
        assert_eq!(
            filled,
            ToolCall::GetPendingNotifications {
                lookahead_minutes: 45,
                user_id: Some(2),
            }
        );
    }

    #[test]
    fn raw_call_rejects_unknown_tool() {
        let result = to_call(
            Command::Call {
                json: r#"{"tool": "drop_calendar"}"#.into(),
            },
            None,
        );
        assert!(matches!(result, Err(CliError::Json(_))));
    }

    #[test]
    fn error_results_fail() {
        assert!(check_result(&json!({ "calendars": [] })).is_ok());
        let err = check_result(&json!({ "error": "Event not found: e1" })).unwrap_err();
        assert_eq!(err.to_string(), "Event not found: e1");
    }

    #[tokio::test]
    async fn empty_registry_reports_tool_error() {
        let ctx = Arc::new(AppContext::new(AccountRegistry::default()));
        let call = to_call(Command::Calendars, None).unwrap();

        let err = run(ctx, call).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "No calendars configured. Set CALENDAR_CONFIG env var."
        );
    }
}
