//! Google Calendar account configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BackendError, BackendResult};

pub const DEFAULT_CALENDAR_ID: &str = "primary";
pub const DEFAULT_TOKEN_FILE: &str = "/data/google_calendar_token.json";
pub const DEFAULT_TIMEZONE: &str = "Europe/Berlin";

/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Google keys as they appear in the accounts file.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleSettings {
    /// OAuth client secrets downloaded from the Cloud Console.
    pub credentials_file: PathBuf,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// IANA zone attached to naive times sent to the API.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_token_file() -> PathBuf {
    PathBuf::from(DEFAULT_TOKEN_FILE)
}

fn default_calendar_id() -> String {
    DEFAULT_CALENDAR_ID.to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

/// OAuth client id and secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Shape of Google's client secrets JSON: either an `installed`/`web`
/// section or the flat form some tools write.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads client secrets from disk.
    ///
    /// `account` only shapes the error message.
    pub fn from_file(path: &Path, account: &str) -> BackendResult<Self> {
        if !path.exists() {
            return Err(BackendError::configuration(format!(
                "Calendar '{}': Google credentials file not found: {}",
                account,
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackendError::configuration(format!(
                "Calendar '{}': failed to read credentials file: {}",
                account, e
            ))
            .with_source(e)
        })?;
        Self::from_json(&content).map_err(|e| {
            BackendError::configuration(format!("Calendar '{}': {}", account, e.message()))
        })
    }

    pub fn from_json(json: &str) -> BackendResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            BackendError::configuration(format!("failed to parse credentials JSON: {}", e))
        })?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }
        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(BackendError::configuration(
            "credentials file must contain an 'installed'/'web' section or 'client_id'/'client_secret'",
        ))
    }
}

/// Resolved configuration for one Google account.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials_file: PathBuf,
    pub token_file: PathBuf,
    pub calendar_id: String,
    pub timezone: String,
    pub api_base: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl GoogleConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn new(credentials_file: impl Into<PathBuf>) -> Self {
        Self {
            credentials_file: credentials_file.into(),
            token_file: default_token_file(),
            calendar_id: default_calendar_id(),
            timezone: default_timezone(),
            api_base: CALENDAR_API_BASE.to_string(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calhub/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn from_settings(settings: &GoogleSettings) -> Self {
        Self::new(settings.credentials_file.clone())
            .with_token_file(settings.token_file.clone())
            .with_calendar_id(settings.calendar_id.clone())
            .with_timezone(settings.timezone.clone())
    }

    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = path.into();
        self
    }

    pub fn with_calendar_id(mut self, id: impl Into<String>) -> Self {
        self.calendar_id = id.into();
        self
    }

    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    /// Points the client at another API root (tests, proxies).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults() {
        let settings: GoogleSettings = serde_json::from_value(serde_json::json!({
            "credentials_file": "/config/google_credentials.json",
        }))
        .unwrap();

        assert_eq!(settings.calendar_id, "primary");
        assert_eq!(settings.token_file, PathBuf::from(DEFAULT_TOKEN_FILE));
        assert_eq!(settings.timezone, "Europe/Berlin");

        let config = GoogleConfig::from_settings(&settings);
        assert_eq!(config.api_base, CALENDAR_API_BASE);
        assert_eq!(
            config.credentials_file,
            PathBuf::from("/config/google_credentials.json")
        );
    }

    #[test]
    fn api_base_trailing_slash_is_dropped() {
        let config = GoogleConfig::new("c.json").with_api_base("http://127.0.0.1:9000/");
        assert_eq!(config.api_base, "http://127.0.0.1:9000");
    }

    #[test]
    fn credentials_from_installed_section() {
        let json = r#"{"installed": {"client_id": "id.apps.googleusercontent.com", "client_secret": "s", "project_id": "p"}}"#;
        let creds = OAuthCredentials::from_json(json).unwrap();
        assert_eq!(creds, OAuthCredentials::new("id.apps.googleusercontent.com", "s"));
    }

    #[test]
    fn credentials_from_web_and_flat() {
        let web = r#"{"web": {"client_id": "w", "client_secret": "ws"}}"#;
        assert_eq!(OAuthCredentials::from_json(web).unwrap().client_id, "w");

        let flat = r#"{"client_id": "f", "client_secret": "fs", "token": "t"}"#;
        assert_eq!(OAuthCredentials::from_json(flat).unwrap().client_secret, "fs");
    }

    #[test]
    fn credentials_without_client_id_fail() {
        let err = OAuthCredentials::from_json(r#"{"other": {}}"#).unwrap_err();
        assert!(err.message().contains("client_id"));
        assert!(OAuthCredentials::from_json("not json").is_err());
    }

    #[test]
    fn missing_credentials_file() {
        let err = OAuthCredentials::from_file(Path::new("/nonexistent/creds.json"), "privat")
            .unwrap_err();
        assert_eq!(err.code(), crate::BackendErrorCode::ConfigurationError);
        assert!(err.message().starts_with("Calendar 'privat': Google credentials file not found"));
    }
}
