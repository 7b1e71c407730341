use serde::Serialize;
use serde_json::Value;
use tracing::Span;

use kabuka_core::{IndicatorReport, RefreshReport, Warehouse};

use crate::cli::RunArgs;
use crate::error::CliError;

use super::{indicators, refresh};

#[derive(Debug, Serialize)]
struct RunResponseData {
    refresh: RefreshReport,
    indicators: IndicatorReport,
}

/// Refresh prices, then rebuild indicators from the updated history.
pub async fn run(args: &RunArgs, warehouse: &Warehouse, span: &Span) -> Result<Value, CliError> {
    let refresh = refresh::refresh(&args.refresh, warehouse, span).await?;
    let indicators = indicators::recompute(&args.indicators, warehouse, span)?;
    Ok(serde_json::to_value(RunResponseData {
        refresh,
        indicators,
    })?)
}
