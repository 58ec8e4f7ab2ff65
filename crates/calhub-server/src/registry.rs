//! Calendar account registry.
//!
//! Accounts come from a YAML file shaped like:
//!
//! ```yaml
//! calendars:
//!   - name: work
//!     label: Firmenkalender
//!     type: ews
//!     visibility: owner
//!     owner_id: 1
//!     ews_url: https://mail.example.com/EWS/Exchange.asmx
//!     username_env: CAL_WORK_USER
//!     password_env: CAL_WORK_PASS
//! ```
//!
//! Keys other than `name`, `label`, `type`, `visibility` and `owner_id` form
//! the provider config handed to the backend factory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use calhub_providers::{BackendError, BackendKind, BackendResult, EnvCredentials};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};

/// Environment variable naming the accounts file.
pub const CONFIG_ENV: &str = "CALENDAR_CONFIG";

/// Accounts file used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "/config/calendar_accounts.yaml";

const RESERVED_KEYS: [&str; 5] = ["name", "label", "type", "visibility", "owner_id"];

/// Who may see an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to every requester.
    #[default]
    Shared,
    /// Visible only to the account's owner and to trusted internal callers.
    Owner,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Owner => "owner",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "owner" => Ok(Self::Owner),
            other => Err(other.to_string()),
        }
    }
}

/// One configured calendar account.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarAccount {
    pub name: String,
    /// Display name, defaults to `name`.
    pub label: String,
    pub kind: BackendKind,
    pub visibility: Visibility,
    pub owner_id: Option<i64>,
    /// Provider-specific keys, passed through to the backend factory.
    pub config: Mapping,
}

impl CalendarAccount {
    pub fn new(name: impl Into<String>, kind: BackendKind) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            kind,
            visibility: Visibility::Shared,
            owner_id: None,
            config: Mapping::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Restricts the account to `owner_id`.
    pub fn with_owner(mut self, owner_id: i64) -> Self {
        self.visibility = Visibility::Owner;
        self.owner_id = Some(owner_id);
        self
    }

    pub fn with_setting(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.config.insert(Value::from(key), value.into());
        self
    }

    /// Deserializes the provider config into a provider's settings type.
    pub fn settings<T: DeserializeOwned>(&self) -> BackendResult<T> {
        serde_yaml::from_value(Value::Mapping(self.config.clone())).map_err(|e| {
            BackendError::configuration(format!(
                "Calendar '{}': invalid {} settings: {}",
                self.name, self.kind, e
            ))
            .with_source(e)
        })
    }

    /// Whether `requester` may see and act on this account.
    ///
    /// `None` is a trusted internal caller and sees everything.
    pub fn is_visible_to(&self, requester: Option<i64>) -> bool {
        match (requester, self.visibility) {
            (None, _) => true,
            (Some(_), Visibility::Shared) => true,
            (Some(id), Visibility::Owner) => self.owner_id == Some(id),
        }
    }

    /// String value of a provider config key.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    fn has_setting(&self, key: &str) -> bool {
        self.config.get(key).is_some_and(|value| !value.is_null())
    }

    /// Credential environment variables referenced by this account.
    pub fn credentials(&self) -> Option<EnvCredentials> {
        match self.kind {
            BackendKind::Ews | BackendKind::Caldav => Some(EnvCredentials::new(
                self.setting("username_env")?,
                self.setting("password_env")?,
            )),
            BackendKind::Google => None,
        }
    }

    /// Referenced credential variables that are unset or empty.
    pub fn missing_env_vars(&self) -> Vec<String> {
        self.credentials()
            .map(|creds| creds.missing_vars().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }

    fn validate_fields(&self) -> ConfigResult<()> {
        let required: &[&[&'static str]] = match self.kind {
            BackendKind::Ews => &[&["ews_url"], &["username_env", "password_env"]],
            BackendKind::Google => &[&["credentials_file"]],
            BackendKind::Caldav => &[&["url"], &["username_env", "password_env"]],
        };
        for group in required {
            if !group.iter().all(|key| self.has_setting(key)) {
                return Err(ConfigError::missing_field(
                    &self.name,
                    self.kind,
                    group.to_vec(),
                ));
            }
        }
        Ok(())
    }
}

/// The validated, ordered set of accounts.
///
/// File order is preserved; it decides the order of merged results and of
/// notifications. The registry is read-only once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountRegistry {
    accounts: Vec<CalendarAccount>,
}

impl AccountRegistry {
    /// Builds a registry from already-constructed accounts.
    ///
    /// Fails on duplicate names and on owner accounts without an owner.
    pub fn new(accounts: Vec<CalendarAccount>) -> ConfigResult<Self> {
        let mut registry = Self::default();
        for account in accounts {
            registry.insert(account)?;
        }
        Ok(registry)
    }

    /// Path of the accounts file: `$CALENDAR_CONFIG` or the default.
    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Loads the file named by `$CALENDAR_CONFIG`.
    pub fn from_env() -> ConfigResult<Self> {
        Self::load(Self::config_path())
    }

    /// Loads an accounts file. A missing file yields an empty registry.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            warn!(path = %path.display(), "Config file not found");
            return Ok(Self::default());
        }

        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let registry = Self::from_yaml_str(&text)?;
        info!(
            path = %path.display(),
            count = registry.len(),
            calendars = ?registry.names(),
            "Loaded calendar accounts"
        );
        Ok(registry)
    }

    /// Parses and validates the YAML text of an accounts file.
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let raw: Value = serde_yaml::from_str(text)?;
        let entries = match raw.get("calendars") {
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                warn!("No 'calendars' key in config file");
                return Ok(Self::default());
            }
        };
        let entries: Vec<Mapping> = serde_yaml::from_value(entries)?;

        let mut registry = Self::default();
        for entry in entries {
            let name = entry_name(&entry)?;
            if registry.get(&name).is_some() {
                return Err(ConfigError::duplicate_name(name));
            }
            let account = parse_entry(name, entry)?;
            account.validate_fields()?;
            for var in account.missing_env_vars() {
                warn!(calendar = %account.name, env_var = %var, "Calendar '{}': env var '{}' not set", account.name, var);
            }
            registry.insert(account)?;
        }
        Ok(registry)
    }

    fn insert(&mut self, account: CalendarAccount) -> ConfigResult<()> {
        if self.get(&account.name).is_some() {
            return Err(ConfigError::duplicate_name(&account.name));
        }
        if account.visibility == Visibility::Owner && account.owner_id.is_none() {
            return Err(ConfigError::missing_owner(&account.name));
        }
        debug!(
            calendar = %account.name,
            kind = %account.kind,
            visibility = %account.visibility,
            "Registered calendar"
        );
        self.accounts.push(account);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CalendarAccount> {
        self.accounts.iter().find(|account| account.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalendarAccount> {
        self.accounts.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.accounts.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

fn entry_name(entry: &Mapping) -> ConfigResult<String> {
    string_field(entry, "name")
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or(ConfigError::MissingName)
}

fn parse_entry(name: String, mut entry: Mapping) -> ConfigResult<CalendarAccount> {
    let kind_raw = string_field(&entry, "type").unwrap_or_default();
    let kind = BackendKind::from_str(&kind_raw)
        .map_err(|e| ConfigError::unknown_type(&name, e.0))?;

    let label = string_field(&entry, "label").unwrap_or_else(|| name.clone());

    let visibility = match string_field(&entry, "visibility") {
        Some(raw) => raw
            .parse::<Visibility>()
            .map_err(|value| ConfigError::invalid_visibility(&name, value))?,
        None => Visibility::Shared,
    };

    let owner_id = match entry.get("owner_id") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            owner_id_value(value)
                .ok_or_else(|| ConfigError::invalid_owner(&name, display_value(value)))?,
        ),
    };
    if visibility == Visibility::Owner && owner_id.is_none() {
        return Err(ConfigError::missing_owner(&name));
    }

    for key in RESERVED_KEYS {
        entry.remove(key);
    }

    Ok(CalendarAccount {
        name,
        label,
        kind,
        visibility,
        owner_id,
        config: entry,
    })
}

fn string_field(entry: &Mapping, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn owner_id_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_else(|_| format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EWS_WORK: &str = r#"
calendars:
  - name: work
    label: "Firmenkalender"
    type: ews
    ews_url: "https://exchange.example.com/EWS/Exchange.asmx"
    username_env: CAL_WORK_USER
    password_env: CAL_WORK_PASS
"#;

    #[test]
    fn loads_ews_account() {
        let registry = AccountRegistry::from_yaml_str(EWS_WORK).unwrap();
        let work = registry.get("work").unwrap();

        assert_eq!(work.kind, BackendKind::Ews);
        assert_eq!(work.label, "Firmenkalender");
        assert_eq!(work.visibility, Visibility::Shared);
        assert_eq!(work.owner_id, None);
        assert_eq!(
            work.setting("ews_url"),
            Some("https://exchange.example.com/EWS/Exchange.asmx")
        );
    }

    #[test]
    fn loads_google_and_caldav_accounts_in_file_order() {
        let registry = AccountRegistry::from_yaml_str(
            r#"
calendars:
  - name: verein
    type: CalDAV
    url: "https://nextcloud.example.com/remote.php/dav/calendars/anna/verein/"
    username_env: CAL_VEREIN_USER
    password_env: CAL_VEREIN_PASS
  - name: family
    label: Familienkalender
    type: google
    calendar_id: primary
    credentials_file: /config/google_creds.json
"#,
        )
        .unwrap();

        assert_eq!(registry.names(), vec!["verein", "family"]);
        assert_eq!(registry.get("verein").unwrap().kind, BackendKind::Caldav);
        assert_eq!(registry.get("verein").unwrap().label, "verein");
        assert_eq!(registry.get("family").unwrap().kind, BackendKind::Google);
    }

    #[test]
    fn missing_file_is_empty_registry() {
        let registry = AccountRegistry::load("/nonexistent/calendar_accounts.yaml").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_calendars_key_is_empty_registry() {
        assert!(AccountRegistry::from_yaml_str("other: 1\n").unwrap().is_empty());
        assert!(AccountRegistry::from_yaml_str("").unwrap().is_empty());
    }

    #[test]
    fn malformed_yaml_is_fatal() {
        let err = AccountRegistry::from_yaml_str("calendars: [name: work").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(EWS_WORK.as_bytes()).unwrap();

        let registry = AccountRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rejects_missing_and_duplicate_names() {
        let err = AccountRegistry::from_yaml_str(
            "calendars:\n  - name: '  '\n    type: google\n    credentials_file: /x\n",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Calendar missing 'name' field");

        let err = AccountRegistry::from_yaml_str(
            r#"
calendars:
  - {name: family, type: google, credentials_file: /x}
  - {name: family, type: google, credentials_file: /y}
"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Duplicate calendar name: 'family'");
    }

    #[test]
    fn duplicate_name_is_reported_before_entry_errors() {
        let err = AccountRegistry::from_yaml_str(
            r#"
calendars:
  - {name: work, type: google, credentials_file: /x}
  - {name: work, type: ews}
"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Duplicate calendar name: 'work'");
    }

    #[test]
    fn rejects_non_integer_owner_id() {
        let err = AccountRegistry::from_yaml_str(
            "calendars:\n  - {name: work, type: google, credentials_file: /x, visibility: owner, owner_id: alice}\n",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Calendar 'work': invalid owner_id 'alice'. Must be an integer"
        );

        let err = AccountRegistry::from_yaml_str(
            "calendars:\n  - {name: family, type: google, credentials_file: /x, owner_id: 1.5}\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOwner { ref value, .. } if value == "1.5"));

        let registry = AccountRegistry::from_yaml_str(
            "calendars:\n  - {name: work, type: google, credentials_file: /x, visibility: owner, owner_id: '7'}\n",
        )
        .unwrap();
        assert_eq!(registry.get("work").unwrap().owner_id, Some(7));
    }

    #[test]
    fn rejects_unknown_type() {
        let err = AccountRegistry::from_yaml_str(
            "calendars:\n  - {name: work, type: outlook}\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownType { ref kind, .. } if kind == "outlook"));
        assert!(err.to_string().starts_with("Calendar 'work': unknown type 'outlook'"));
    }

    #[test]
    fn rejects_missing_provider_fields() {
        let err = AccountRegistry::from_yaml_str(
            "calendars:\n  - {name: work, type: ews, username_env: U, password_env: P}\n",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Calendar 'work' (ews): 'ews_url' is required");

        let err = AccountRegistry::from_yaml_str(
            "calendars:\n  - {name: verein, type: caldav, url: 'https://dav.example.com/', username_env: U}\n",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Calendar 'verein' (caldav): 'username_env' and 'password_env' are required"
        );

        let err = AccountRegistry::from_yaml_str("calendars:\n  - {name: family, type: google}\n")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Calendar 'family' (google): 'credentials_file' is required"
        );
    }

    #[test]
    fn owner_visibility() {
        let registry = AccountRegistry::from_yaml_str(
            r#"
calendars:
  - name: work
    type: ews
    visibility: owner
    owner_id: 1
    ews_url: "https://exchange.example.com/EWS/Exchange.asmx"
    username_env: U
    password_env: P
"#,
        )
        .unwrap();
        let work = registry.get("work").unwrap();

        assert_eq!(work.visibility, Visibility::Owner);
        assert_eq!(work.owner_id, Some(1));
        assert!(!work.config.contains_key("visibility"));
        assert!(!work.config.contains_key("owner_id"));
        assert!(!work.config.contains_key("name"));
    }

    #[test]
    fn owner_without_owner_id_is_rejected() {
        let err = AccountRegistry::from_yaml_str(
            "calendars:\n  - {name: work, type: google, credentials_file: /x, visibility: owner}\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("requires 'owner_id'"));
    }

    #[test]
    fn invalid_visibility_is_rejected() {
        let err = AccountRegistry::from_yaml_str(
            "calendars:\n  - {name: work, type: google, credentials_file: /x, visibility: private}\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid visibility 'private'"));
    }

    #[test]
    fn visibility_policy() {
        let shared = CalendarAccount::new("family", BackendKind::Google);
        let owned = CalendarAccount::new("work", BackendKind::Ews).with_owner(1);

        assert!(shared.is_visible_to(None));
        assert!(shared.is_visible_to(Some(999)));
        assert!(owned.is_visible_to(None));
        assert!(owned.is_visible_to(Some(1)));
        assert!(!owned.is_visible_to(Some(2)));
    }

    #[test]
    fn registry_new_rejects_duplicates() {
        let err = AccountRegistry::new(vec![
            CalendarAccount::new("work", BackendKind::Ews),
            CalendarAccount::new("work", BackendKind::Google),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName { .. }));
    }

    #[test]
    fn reports_unset_credential_vars() {
        let account = CalendarAccount::new("verein", BackendKind::Caldav)
            .with_setting("username_env", "CALHUB_TEST_REGISTRY_UNSET_USER")
            .with_setting("password_env", "PATH");
        assert_eq!(
            account.missing_env_vars(),
            vec!["CALHUB_TEST_REGISTRY_UNSET_USER".to_string()]
        );

        let google = CalendarAccount::new("family", BackendKind::Google);
        assert!(google.missing_env_vars().is_empty());
    }
}
