//! Command-line interface definition.

use std::path::PathBuf;

use calhub_core::TracingOutputFormat;
use clap::{Parser, Subcommand, ValueEnum};

/// calhub - one view over all your calendars
#[derive(Debug, Parser)]
#[command(name = "calhub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the calendar accounts file
    #[arg(long, short, global = true, env = "CALENDAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Act on behalf of this user; owner-only calendars of other users are hidden
    #[arg(long, global = true)]
    pub user_id: Option<i64>,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output formats selectable with `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for TracingOutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => TracingOutputFormat::Pretty,
            LogFormat::Compact => TracingOutputFormat::Compact,
            LogFormat::Json => TracingOutputFormat::Json,
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the calendars visible to the caller
    Calendars,

    /// List events in a time range
    Events {
        /// Calendar name; omit to merge all visible calendars
        #[arg(long, default_value = "")]
        calendar: String,

        /// Range start (ISO 8601 or YYYY-MM-DD); defaults to today
        #[arg(long, default_value = "")]
        start: String,

        /// Range end; defaults to the end of the start day
        #[arg(long, default_value = "")]
        end: String,
    },

    /// Create an event
    Create {
        #[arg(long)]
        calendar: String,

        #[arg(long)]
        title: String,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "")]
        location: String,
    },

    /// Change fields of an event; omitted fields are kept
    Update {
        #[arg(long)]
        calendar: String,

        #[arg(long)]
        event_id: String,

        #[arg(long, default_value = "")]
        title: String,

        #[arg(long, default_value = "")]
        start: String,

        #[arg(long, default_value = "")]
        end: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "")]
        location: String,
    },

    /// Delete an event
    Delete {
        #[arg(long)]
        calendar: String,

        #[arg(long)]
        event_id: String,
    },

    /// Show one event
    Get {
        #[arg(long)]
        calendar: String,

        #[arg(long)]
        event_id: String,
    },

    /// Show reminders due right now
    Notifications {
        /// How far ahead to look, in minutes
        #[arg(long, default_value_t = calhub_server::DEFAULT_LOOKAHEAD_MINUTES)]
        lookahead: u32,
    },

    /// Run a tool call given as JSON, e.g. '{"tool": "list_calendars"}'
    Call {
        /// The serialized tool call
        json: String,
    },

    /// Validate the accounts file and report missing credentials
    Check,

    /// Authorize a calendar account
    #[cfg(feature = "google")]
    Auth {
        #[command(subcommand)]
        provider: AuthProvider,
    },

    /// Poll for reminders and print each one once
    Watch {
        /// Seconds between scans
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,

        /// Lookahead per scan, in minutes
        #[arg(long)]
        lookahead: Option<u32>,

        /// Also show reminders as desktop notifications
        #[arg(long)]
        desktop: bool,

        /// Icon for desktop notifications
        #[arg(long, requires = "desktop")]
        icon: Option<String>,

        /// Seconds a desktop notification stays visible
        #[arg(long, requires = "desktop")]
        popup_timeout: Option<u32>,
    },
}

/// Providers with an interactive authorization flow.
#[cfg(feature = "google")]
#[derive(Debug, Subcommand)]
pub enum AuthProvider {
    /// Run the Google OAuth flow and write the account's token file
    Google {
        /// Account to authorize; defaults to the first Google calendar
        #[arg(long)]
        calendar: Option<String>,

        /// Re-authorize even if the stored token is still valid
        #[arg(long, short)]
        force: bool,
    },
}
