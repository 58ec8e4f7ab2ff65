//! The `calhub` command-line interface.
//!
//! Every subcommand except `check` and `watch` runs exactly one tool call and
//! prints its JSON result to stdout. Logs go to stderr.

pub mod cli;
pub mod commands;
pub mod error;
pub mod signals;

pub use cli::{Cli, Command};
pub use error::{CliError, CliResult};
