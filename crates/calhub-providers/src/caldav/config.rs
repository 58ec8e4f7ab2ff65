//! CalDAV account configuration.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::credentials::EnvCredentials;
use crate::error::{BackendError, BackendResult};

/// CalDAV keys as they appear in the accounts file.
#[derive(Debug, Clone, Deserialize)]
pub struct CalDavSettings {
    /// Calendar collection URL, or the principal URL when `calendar_name` is set.
    pub url: String,
    #[serde(flatten)]
    pub credentials: EnvCredentials,
    /// Display name of the calendar to pick from the principal's collections.
    #[serde(default)]
    pub calendar_name: Option<String>,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_verify_tls() -> bool {
    true
}

/// Resolved configuration for one CalDAV account.
#[derive(Debug, Clone)]
pub struct CalDavConfig {
    pub url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
    pub calendar_name: Option<String>,
    pub verify_tls: bool,
    pub timeout: Duration,
    pub user_agent: String,
}

impl CalDavConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url.as_ref())?;
        Ok(Self {
            url: parsed,
            username: None,
            password: None,
            calendar_name: None,
            verify_tls: true,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calhub/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Builds the config from file settings. Credentials are filled in later.
    pub fn from_settings(settings: &CalDavSettings) -> BackendResult<Self> {
        let mut config = Self::new(&settings.url).map_err(|e| {
            BackendError::configuration(format!("invalid CalDAV url '{}': {}", settings.url, e))
                .with_source(e)
        })?;
        config.calendar_name = settings.calendar_name.clone();
        config.verify_tls = settings.verify_tls;
        Ok(config)
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_calendar_name(mut self, name: impl Into<String>) -> Self {
        self.calendar_name = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_yaml_shape() {
        let settings: CalDavSettings = serde_json::from_value(serde_json::json!({
            "url": "https://cloud.example.com/remote.php/dav/calendars/anna/family/",
            "username_env": "NC_USER",
            "password_env": "NC_PASS",
        }))
        .unwrap();
        assert_eq!(settings.credentials.username_env, "NC_USER");
        assert!(settings.calendar_name.is_none());
        assert!(settings.verify_tls);

        let config = CalDavConfig::from_settings(&settings).unwrap();
        assert_eq!(
            config.url.as_str(),
            "https://cloud.example.com/remote.php/dav/calendars/anna/family/"
        );
        assert!(!config.has_credentials());
    }

    #[test]
    fn invalid_url_is_configuration_error() {
        let settings = CalDavSettings {
            url: "not a url".into(),
            credentials: EnvCredentials::new("U", "P"),
            calendar_name: None,
            verify_tls: true,
        };
        let err = CalDavConfig::from_settings(&settings).unwrap_err();
        assert_eq!(err.code(), crate::BackendErrorCode::ConfigurationError);
        assert!(err.message().contains("not a url"));
    }

    #[test]
    fn builder_methods() {
        let config = CalDavConfig::new("https://dav.example.com/")
            .unwrap()
            .with_credentials("anna", "secret")
            .with_calendar_name("Familie")
            .with_timeout(Duration::from_secs(5));

        assert!(config.has_credentials());
        assert_eq!(config.calendar_name.as_deref(), Some("Familie"));
        assert!(config.verify_tls);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
