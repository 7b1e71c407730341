mod cli;
mod commands;
mod error;
mod logging;
mod metadata;
mod output;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.log_dir.as_deref())?;

    let envelope = commands::run(&cli).await.inspect_err(|error| {
        tracing::error!(exit_code = error.exit_code(), %error, "command failed");
    })?;
    output::render(&envelope, cli.pretty)?;

    Ok(ExitCode::SUCCESS)
}
