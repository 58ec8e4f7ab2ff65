//! CLI error types.

use calhub_providers::BackendError;
use calhub_server::ConfigError;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that end a `calhub` run with a non-zero exit code.
#[derive(Debug, Error)]
pub enum CliError {
    /// The accounts file could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A `call` argument that is not a valid tool call.
    #[error("invalid tool call: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tool ran and returned `{"error": ..}`.
    #[error("{0}")]
    Tool(String),

    /// A provider call made directly by the CLI failed.
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// `auth` could not pick an account to authorize.
    #[error("{0}")]
    Auth(String),

    /// `check` found problems in the accounts file.
    #[error("{0} problem(s) found in calendar configuration")]
    Check(usize),
}
