mod companies;
mod indicators;
mod refresh;
mod run;

use std::time::Instant;

use serde_json::Value;
use time::{Date, OffsetDateTime};
use tracing::Span;

use kabuka_core::{parse_trading_date, Warehouse, WarehouseConfig};

use crate::cli::{Cli, CompaniesCommand, Command};
use crate::error::CliError;
use crate::metadata::{Envelope, Meta, RunId};

pub async fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let run_id = RunId::new_v4();
    let command = command_name(&cli.command);
    let span = tracing::info_span!("run", %run_id, command);
    let started_at = OffsetDateTime::now_utc();
    let clock = Instant::now();

    let warehouse = open_warehouse(cli, &span)?;
    tracing::info!(
        parent: &span,
        kabuka_home = %warehouse.config().kabuka_home.display(),
        db_path = %warehouse.db_path().display(),
        "command started"
    );

    let data: Value = match &cli.command {
        Command::Refresh(args) => refresh::run(args, &warehouse, &span).await?,
        Command::Indicators(args) => indicators::run(args, &warehouse, &span)?,
        Command::Run(args) => run::run(args, &warehouse, &span).await?,
        Command::Companies(args) => match &args.command {
            CompaniesCommand::Import(import) => companies::import(import, &warehouse, &span)?,
            CompaniesCommand::List(list) => companies::list(list, &warehouse)?,
        },
    };

    let elapsed_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::info!(parent: &span, elapsed_ms, "command finished");

    Ok(Envelope {
        meta: Meta {
            run_id,
            command,
            started_at,
            elapsed_ms,
        },
        data,
    })
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Refresh(_) => "refresh",
        Command::Indicators(_) => "indicators",
        Command::Run(_) => "run",
        Command::Companies(args) => match args.command {
            CompaniesCommand::Import(_) => "companies.import",
            CompaniesCommand::List(_) => "companies.list",
        },
    }
}

fn open_warehouse(cli: &Cli, span: &Span) -> Result<Warehouse, CliError> {
    let warehouse = match &cli.db_path {
        Some(db_path) => Warehouse::open(WarehouseConfig::with_db_path(db_path))?,
        None => Warehouse::open_default()?,
    };
    Ok(warehouse.with_span(span.clone()))
}

fn parse_date_arg(name: &str, value: Option<&str>) -> Result<Option<Date>, CliError> {
    value
        .map(|raw| {
            parse_trading_date(raw)
                .map_err(|error| CliError::Config(format!("--{name} '{raw}': {error}")))
        })
        .transpose()
}
