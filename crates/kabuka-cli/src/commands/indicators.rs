use serde_json::Value;
use tracing::Span;

use kabuka_core::{DateBounds, IndicatorConfig, IndicatorRecomputer, IndicatorReport, Warehouse};

use crate::cli::IndicatorArgs;
use crate::error::CliError;

use super::parse_date_arg;

pub fn run(args: &IndicatorArgs, warehouse: &Warehouse, span: &Span) -> Result<Value, CliError> {
    let report = recompute(args, warehouse, span)?;
    Ok(serde_json::to_value(report)?)
}

pub(super) fn recompute(
    args: &IndicatorArgs,
    warehouse: &Warehouse,
    span: &Span,
) -> Result<IndicatorReport, CliError> {
    let bounds = DateBounds {
        from: parse_date_arg("from", args.from.as_deref())?,
        to: parse_date_arg("to", args.to.as_deref())?,
    };
    if let (Some(from), Some(to)) = (bounds.from, bounds.to) {
        if from > to {
            return Err(CliError::Config(format!("--from {from} is after --to {to}")));
        }
    }

    let config = IndicatorConfig {
        spans: args.spans.clone(),
    };
    let report = IndicatorRecomputer::new(warehouse.clone(), config)
        .with_bounds(bounds)
        .with_span(span.clone())
        .recompute()?;
    Ok(report)
}
