//! calhub CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use calhub_cli::cli::{Cli, Command};
use calhub_cli::commands;
use calhub_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Long-running watch gets timestamped info logs
    let mut tracing = match cli.command {
        Command::Watch { .. } if !cli.debug => TracingConfig::watcher(),
        _ => TracingConfig::for_cli(cli.debug),
    };
    if let Some(format) = cli.log_format {
        tracing = tracing.with_format(format.into());
    }
    if let Err(e) = init_tracing(tracing) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
