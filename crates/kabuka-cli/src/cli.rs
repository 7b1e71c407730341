//! CLI argument definitions for kabuka.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `refresh` | Fetch new daily prices for every company of a country |
//! | `indicators` | Recompute the moving-average table |
//! | `run` | `refresh` followed by `indicators` |
//! | `companies import` | Load company master data from CSV |
//! | `companies list` | Print stored companies |
//!
//! # Examples
//!
//! ```bash
//! kabuka companies import demos/companies.csv
//! kabuka refresh --country JP --pretty
//! kabuka indicators --spans 5,25,75
//! KABUKA_LOG=debug kabuka run --log-dir ./logs
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Daily stock prices and moving averages in a local DuckDB warehouse.
#[derive(Debug, Parser)]
#[command(
    name = "kabuka",
    author,
    version,
    about = "Daily stock prices and moving averages in a local DuckDB warehouse"
)]
pub struct Cli {
    /// Warehouse database file. Defaults to `$KABUKA_HOME/warehouse.duckdb`.
    #[arg(long, global = true, env = "KABUKA_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Directory receiving the daily rolling `application.log`.
    ///
    /// Without it, logs go to stderr only.
    #[arg(long, global = true, env = "KABUKA_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch prices published since each company's last stored date.
    ///
    /// # Examples
    ///
    ///   kabuka refresh
    ///   kabuka refresh --country JP --today 2020-02-29
    Refresh(RefreshArgs),

    /// Rebuild every moving average from the stored price history.
    ///
    /// # Examples
    ///
    ///   kabuka indicators
    ///   kabuka indicators --spans 5,20 --from 2020-01-01
    Indicators(IndicatorArgs),

    /// Refresh prices, then rebuild moving averages.
    Run(RunArgs),

    /// Manage company master data.
    Companies(CompaniesArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RefreshArgs {
    /// Country whose companies are refreshed.
    #[arg(long, env = "KABUKA_COUNTRY", default_value = "JP")]
    pub country: String,

    /// First date requested for companies without stored prices (YYYY-MM-DD).
    #[arg(long, env = "KABUKA_START_DATE")]
    pub start_date: Option<String>,

    /// Market date to refresh as of (YYYY-MM-DD). Defaults to today in Tokyo.
    #[arg(long)]
    pub today: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct IndicatorArgs {
    /// Window spans computed for every algorithm.
    #[arg(
        long,
        env = "KABUKA_MA_SPANS",
        value_delimiter = ',',
        default_values_t = [5usize, 25, 75]
    )]
    pub spans: Vec<usize>,

    /// Keep only values dated on or after this date (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<String>,

    /// Keep only values dated on or before this date (YYYY-MM-DD).
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub refresh: RefreshArgs,

    #[command(flatten)]
    pub indicators: IndicatorArgs,
}

#[derive(Debug, Args)]
pub struct CompaniesArgs {
    #[command(subcommand)]
    pub command: CompaniesCommand,
}

#[derive(Debug, Subcommand)]
pub enum CompaniesCommand {
    /// Merge companies from a CSV file into the master table.
    Import(ImportArgs),

    /// List stored companies.
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// CSV file with a header row.
    pub path: PathBuf,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only companies of this country.
    #[arg(long)]
    pub country: Option<String>,
}
