//! `calhub check`: validate the accounts file without contacting any server.

use std::io::Write;

use calhub_server::{AccountRegistry, BackendFactory, Visibility};
use tracing::warn;

use crate::error::{CliError, CliResult};

/// Prints one line per account and fails if any account cannot be used.
///
/// Structural errors (duplicate names, unknown types, missing keys) already
/// stopped loading. This reports what loading tolerates: unset credential
/// variables and settings the backend rejects at construction.
pub fn run(
    registry: &AccountRegistry,
    factory: &dyn BackendFactory,
    out: &mut impl Write,
) -> CliResult<()> {
    let problems = report(registry, factory, out)?;
    if problems > 0 {
        return Err(CliError::Check(problems));
    }
    writeln!(out, "Configuration is valid.")?;
    Ok(())
}

fn report(
    registry: &AccountRegistry,
    factory: &dyn BackendFactory,
    out: &mut impl Write,
) -> CliResult<usize> {
    if registry.is_empty() {
        writeln!(out, "No calendars configured.")?;
        return Ok(1);
    }

    let mut problems = 0;
    for account in registry.iter() {
        let access = match (account.visibility, account.owner_id) {
            (Visibility::Owner, Some(owner)) => format!("owner {}", owner),
            (visibility, _) => visibility.to_string(),
        };
        writeln!(
            out,
            "{} ({}) [{}, {}]",
            account.name, account.label, account.kind, access
        )?;

        for var in account.missing_env_vars() {
            writeln!(out, "  missing environment variable: {}", var)?;
            problems += 1;
        }

        if let Err(e) = factory.create(account) {
            warn!(calendar = %account.name, error = %e, "Backend rejected its settings");
            writeln!(out, "  backend error: {}", e)?;
            problems += 1;
        }
    }

    Ok(problems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calhub_providers::{BackendError, BackendKind, BackendResult, CalendarBackend, ErrorBackend};
    use calhub_server::CalendarAccount;
    use std::sync::Arc;

    /// Accepts every account except the ones named `broken*`.
    struct PickyFactory;

    impl BackendFactory for PickyFactory {
        fn create(&self, account: &CalendarAccount) -> BackendResult<Arc<dyn CalendarBackend>> {
            if account.name.starts_with("broken") {
                return Err(BackendError::configuration("invalid URL").with_backend(account.kind.as_str()));
            }
            let unused = BackendError::configuration("unused");
            Ok(Arc::new(ErrorBackend::new(account.kind, &unused)))
        }
    }

    fn output(registry: &AccountRegistry) -> (CliResult<()>, String) {
        let mut out = Vec::new();
        let result = run(registry, &PickyFactory, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn valid_registry() {
        let registry = AccountRegistry::new(vec![
            CalendarAccount::new("work", BackendKind::Google).with_label("Firmenkalender"),
            CalendarAccount::new("private", BackendKind::Google).with_owner(42),
        ])
        .unwrap();

        let (result, text) = output(&registry);
        assert!(result.is_ok());
        assert!(text.contains("work (Firmenkalender) [google, shared]"));
        assert!(text.contains("private (private) [google, owner 42]"));
        assert!(text.ends_with("Configuration is valid.\n"));
    }

    #[test]
    fn reports_missing_env_and_backend_errors() {
        let registry = AccountRegistry::new(vec![
            CalendarAccount::new("verein", BackendKind::Caldav)
                .with_setting("url", "https://dav.example.org/cal/")
                .with_setting("username_env", "CALHUB_CHECK_TEST_UNSET_USER")
                .with_setting("password_env", "CALHUB_CHECK_TEST_UNSET_PASS"),
            CalendarAccount::new("broken", BackendKind::Ews),
        ])
        .unwrap();

        let (result, text) = output(&registry);
        assert!(matches!(result, Err(CliError::Check(3))));
        assert!(text.contains("missing environment variable: CALHUB_CHECK_TEST_UNSET_USER"));
        assert!(text.contains("missing environment variable: CALHUB_CHECK_TEST_UNSET_PASS"));
        assert!(text.contains("backend error: [ews] configuration_error: invalid URL"));
        assert!(!text.contains("Configuration is valid."));
    }

    #[test]
    fn empty_registry_is_a_problem() {
        let (result, text) = output(&AccountRegistry::default());
        assert!(matches!(result, Err(CliError::Check(1))));
        assert_eq!(text, "No calendars configured.\n");
    }
}
