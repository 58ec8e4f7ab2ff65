//! Stored OAuth token.
//!
//! `calhub auth google` writes the token file; backends read it and check
//! the expiry.

use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{BackendError, BackendResult};

/// Tokens closer than this to their expiry count as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// The persisted token, as `google-auth` style tools write it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenInfo {
    #[serde(alias = "access_token")]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "expires_at", deserialize_with = "deserialize_expiry")]
    pub expiry: Option<DateTime<Utc>>,
}

impl TokenInfo {
    pub fn new(token: impl Into<String>, expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            refresh_token: None,
            expiry,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    /// Writes the token file, creating parent directories.
    ///
    /// On Unix the file is readable by the owner only.
    pub fn save(&self, path: &Path) -> BackendResult<()> {
        let io_error = |e: std::io::Error| {
            BackendError::configuration(format!(
                "failed to write token file {}: {}",
                path.display(),
                e
            ))
            .with_source(e)
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BackendError::internal(format!("failed to encode token: {}", e)))?;
        std::fs::write(path, json).map_err(io_error)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(io_error)?;
        }

        debug!(path = %path.display(), "Saved Google token");
        Ok(())
    }

    /// Reads the token file.
    ///
    /// A missing or unreadable file is an authentication failure so callers
    /// can tell the user to re-authorize.
    pub fn load(path: &Path, account: &str) -> BackendResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| reauthenticate(account).with_source(e))?;
        let token: TokenInfo = serde_json::from_str(&content).map_err(|e| {
            BackendError::authentication(format!(
                "Calendar '{}': token file {} is not valid JSON: {}",
                account,
                path.display(),
                e
            ))
        })?;
        debug!(account = %account, path = %path.display(), "Loaded Google token");
        Ok(token)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| now + Duration::seconds(EXPIRY_MARGIN_SECS) >= expiry)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Fails with the re-authentication message when the token is unusable.
    pub fn ensure_valid(self, account: &str) -> BackendResult<Self> {
        if self.token.is_empty() || self.is_expired() {
            return Err(reauthenticate(account));
        }
        Ok(self)
    }
}

pub(crate) fn reauthenticate(account: &str) -> BackendError {
    BackendError::authentication(format!(
        "Calendar '{0}': Google token not found or expired. Run 'calhub auth google --calendar {0}' to re-authorize.",
        account
    ))
}

/// Accepts RFC 3339 as well as offset-less timestamps, which are UTC.
fn deserialize_expiry<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}
