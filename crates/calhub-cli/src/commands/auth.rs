//! `calhub auth google`: authorize a Google account and store its token.

use std::io::Write;
use std::path::Path;

use calhub_providers::BackendKind;
use calhub_providers::google::{
    CALENDAR_SCOPE, GoogleSettings, OAuthClient, OAuthCredentials, TokenInfo,
};
use calhub_server::{AccountRegistry, CalendarAccount};
use tracing::info;

use crate::error::{CliError, CliResult};

/// Picks the account named by `--calendar`, or the first Google account.
pub fn google_account<'a>(
    registry: &'a AccountRegistry,
    calendar: Option<&str>,
) -> CliResult<&'a CalendarAccount> {
    let account = match calendar {
        Some(name) => registry.get(name).ok_or_else(|| {
            CliError::Auth(format!(
                "Unknown calendar: {}. Available: [{}]",
                name,
                registry.names().join(", ")
            ))
        })?,
        None => registry
            .iter()
            .find(|account| account.kind == BackendKind::Google)
            .ok_or_else(|| CliError::Auth("No Google calendar found in config".into()))?,
    };

    if account.kind != BackendKind::Google {
        return Err(CliError::Auth(format!(
            "Calendar '{}' is type '{}', not 'google'",
            account.name, account.kind
        )));
    }
    Ok(account)
}

fn has_usable_token(path: &Path, account: &str) -> bool {
    TokenInfo::load(path, account)
        .and_then(|token| token.ensure_valid(account))
        .is_ok()
}

/// Runs the browser flow and writes the account's `token_file`.
///
/// An unexpired token is kept unless `force` is set.
pub async fn google(
    registry: &AccountRegistry,
    calendar: Option<&str>,
    force: bool,
    out: &mut impl Write,
) -> CliResult<()> {
    let account = google_account(registry, calendar)?;
    let settings: GoogleSettings = account.settings()?;
    let credentials = OAuthCredentials::from_file(&settings.credentials_file, &account.name)?;

    if !force && has_usable_token(&settings.token_file, &account.name) {
        writeln!(
            out,
            "Calendar '{}' is already authorized. Use --force to re-authorize.",
            account.name
        )?;
        return Ok(());
    }

    writeln!(
        out,
        "Authorizing Google calendar '{}'. A browser window will open.",
        account.name
    )?;
    let token = OAuthClient::new(credentials)?
        .authorize(&[CALENDAR_SCOPE])
        .await?;
    token.save(&settings.token_file)?;

    info!(calendar = %account.name, path = %settings.token_file.display(), "Google token saved");
    writeln!(out, "Token saved to {}", settings.token_file.display())?;
    writeln!(out, "Google Calendar authorization complete.")?;
    Ok(())
}
