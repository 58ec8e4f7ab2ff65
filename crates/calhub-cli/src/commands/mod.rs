//! Subcommand implementations.

#[cfg(feature = "google")]
pub mod auth;
pub mod check;
pub mod tool;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use calhub_server::{AccountRegistry, AppContext, ProviderFactory};
use tracing::debug;

#[cfg(feature = "google")]
use crate::cli::AuthProvider;
use crate::cli::{Cli, Command};
use crate::error::CliResult;

/// Loads the accounts file named on the command line, or the one from the environment.
pub fn load_registry(config: Option<&Path>) -> CliResult<AccountRegistry> {
    let registry = match config {
        Some(path) => AccountRegistry::load(path)?,
        None => AccountRegistry::from_env()?,
    };
    debug!(calendars = registry.len(), "Registry loaded");
    Ok(registry)
}

/// Runs the parsed command line.
pub async fn run(cli: Cli) -> CliResult<()> {
    let registry = load_registry(cli.config.as_deref())?;

    match cli.command {
        #[cfg(feature = "google")]
        Command::Auth {
            provider: AuthProvider::Google { calendar, force },
        } => {
            let mut stderr = std::io::stderr().lock();
            auth::google(&registry, calendar.as_deref(), force, &mut stderr).await
        }
        Command::Check => {
            let mut stdout = std::io::stdout().lock();
            check::run(&registry, &ProviderFactory, &mut stdout)
        }
        Command::Watch {
            interval,
            lookahead,
            desktop,
            icon,
            popup_timeout,
        } => {
            let ctx = Arc::new(AppContext::new(registry));
            let popups = desktop.then(|| watch::notify_config(icon, popup_timeout));
            watch::run(ctx, cli.user_id, interval, lookahead, popups).await
        }
        command => {
            let call = tool::to_call(command, cli.user_id)?;
            let ctx = Arc::new(AppContext::new(registry));
            tool::run(ctx, call).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_named_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "calendars:\n  - name: work\n    label: Arbeit\n    type: google\n    credentials_file: /secrets/google.json"
        )
        .unwrap();

        let registry = load_registry(Some(file.path())).unwrap();
        assert_eq!(registry.names(), vec!["work"]);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = load_registry(Some(dir.path().join("absent.yaml").as_path())).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "calendars:\n  - name: work\n    type: outlook").unwrap();

        let err = load_registry(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("unknown type 'outlook'"));
    }
}
