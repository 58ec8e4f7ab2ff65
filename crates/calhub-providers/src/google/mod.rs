//! Google Calendar backend.
//!
//! Uses the Calendar API v3 `events` resource with the access token that
//! [`OAuthClient::authorize`] stored in the account's `token_file`.
//! Recurring events are expanded server-side (`singleEvents=true`). Naive
//! times sent on insert and patch carry the account's configured IANA zone.

mod backend;
mod client;
mod config;
mod oauth;
mod tokens;

pub use backend::GoogleBackend;
pub use config::{
    CALENDAR_API_BASE, DEFAULT_CALENDAR_ID, DEFAULT_TIMEZONE, DEFAULT_TOKEN_FILE, GoogleConfig,
    GoogleSettings, OAuthCredentials,
};
pub use oauth::{CALENDAR_SCOPE, Callback, OAuthClient, PkceFlow, parse_callback};
pub use tokens::TokenInfo;
