//! Exchange account configuration.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::credentials::EnvCredentials;
use crate::error::{BackendError, BackendResult};

/// EWS keys as they appear in the accounts file.
#[derive(Debug, Clone, Deserialize)]
pub struct EwsSettings {
    /// Service endpoint, e.g. `https://mail.example.com/EWS/Exchange.asmx`.
    pub ews_url: String,
    #[serde(flatten)]
    pub credentials: EnvCredentials,
    /// Mailbox to open; defaults to the login name.
    #[serde(default)]
    pub email: Option<String>,
}

/// Resolved configuration for one Exchange mailbox.
#[derive(Debug, Clone)]
pub struct EwsConfig {
    pub url: Url,
    pub email: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl EwsConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn new(url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: Url::parse(url.as_ref())?,
            email: None,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calhub/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn from_settings(settings: &EwsSettings) -> BackendResult<Self> {
        let config = Self::new(&settings.ews_url).map_err(|e| {
            BackendError::configuration(format!("invalid EWS url '{}': {}", settings.ews_url, e))
                .with_source(e)
        })?;
        Ok(match settings.email {
            Some(ref email) => config.with_email(email.clone()),
            None => config,
        })
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Mailbox address used for the calendar folder.
    pub fn mailbox<'a>(&'a self, username: &'a str) -> &'a str {
        self.email.as_deref().unwrap_or(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_yaml_shape() {
        let settings: EwsSettings = serde_json::from_value(serde_json::json!({
            "ews_url": "https://mail.example.com/EWS/Exchange.asmx",
            "username_env": "EWS_USER",
            "password_env": "EWS_PASS",
        }))
        .unwrap();
        let config = EwsConfig::from_settings(&settings).unwrap();

        assert_eq!(config.url.host_str(), Some("mail.example.com"));
        assert_eq!(config.mailbox("anna@example.com"), "anna@example.com");
    }

    #[test]
    fn explicit_email_wins() {
        let config = EwsConfig::new("https://mail.example.com/EWS/Exchange.asmx")
            .unwrap()
            .with_email("team@example.com");
        assert_eq!(config.mailbox("anna"), "team@example.com");
    }

    #[test]
    fn invalid_url() {
        let settings = EwsSettings {
            ews_url: "mail.example.com".into(),
            credentials: EnvCredentials::new("U", "P"),
            email: None,
        };
        let err = EwsConfig::from_settings(&settings).unwrap_err();
        assert_eq!(err.code(), crate::BackendErrorCode::ConfigurationError);
    }
}
