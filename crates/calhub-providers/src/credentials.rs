//! Credentials referenced through environment variables.
//!
//! Account files never hold secrets. They name the variables that do, and
//! backends resolve them on first use.

use serde::Deserialize;

use crate::error::{BackendError, BackendResult};

/// A username/password pair held in two environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvCredentials {
    pub username_env: String,
    pub password_env: String,
}

impl EnvCredentials {
    pub fn new(username_env: impl Into<String>, password_env: impl Into<String>) -> Self {
        Self {
            username_env: username_env.into(),
            password_env: password_env.into(),
        }
    }

    /// Names of the referenced variables that are unset or empty.
    pub fn missing_vars(&self) -> Vec<&str> {
        [self.username_env.as_str(), self.password_env.as_str()]
            .into_iter()
            .filter(|var| read_env(var).is_none())
            .collect()
    }

    /// Reads both variables.
    ///
    /// `account` and `family` only shape the error message.
    pub fn resolve(&self, account: &str, family: &str) -> BackendResult<(String, String)> {
        match (read_env(&self.username_env), read_env(&self.password_env)) {
            (Some(username), Some(password)) => Ok((username, password)),
            _ => Err(BackendError::authentication(format!(
                "Calendar '{}': {} credentials not set ({}, {})",
                account, family, self.username_env, self.password_env
            ))),
        }
    }
}

fn read_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_are_reported() {
        let creds = EnvCredentials::new(
            "CALHUB_TEST_SURELY_UNSET_USER",
            "CALHUB_TEST_SURELY_UNSET_PASS",
        );
        assert_eq!(
            creds.missing_vars(),
            vec!["CALHUB_TEST_SURELY_UNSET_USER", "CALHUB_TEST_SURELY_UNSET_PASS"]
        );

        let err = creds.resolve("work", "EWS").unwrap_err();
        assert_eq!(
            err.message(),
            "Calendar 'work': EWS credentials not set (CALHUB_TEST_SURELY_UNSET_USER, CALHUB_TEST_SURELY_UNSET_PASS)"
        );
    }

    #[test]
    fn set_variables_resolve() {
        // PATH is set in any test environment.
        let creds = EnvCredentials::new("PATH", "PATH");
        assert!(creds.missing_vars().is_empty());
        let (user, pass) = creds.resolve("work", "CalDAV").unwrap();
        assert!(!user.is_empty());
        assert!(!pass.is_empty());
    }
}
