use std::sync::Arc;

use serde_json::Value;
use tracing::Span;

use kabuka_core::{
    FetchPolicyConfig, HttpClient, KabutanAdapter, PriceRefresher, RefreshConfig, RefreshReport,
    ReqwestHttpClient, StooqAdapter, Warehouse,
};

use crate::cli::RefreshArgs;
use crate::error::CliError;

use super::parse_date_arg;

pub async fn run(args: &RefreshArgs, warehouse: &Warehouse, span: &Span) -> Result<Value, CliError> {
    let report = refresh(args, warehouse, span).await?;
    Ok(serde_json::to_value(report)?)
}

pub(super) async fn refresh(
    args: &RefreshArgs,
    warehouse: &Warehouse,
    span: &Span,
) -> Result<RefreshReport, CliError> {
    let config = refresh_config(args)?;
    let today = parse_date_arg("today", args.today.as_deref())?;

    let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let refresher = PriceRefresher::new(
        warehouse.clone(),
        Arc::new(StooqAdapter::with_http_client(Arc::clone(&http_client))),
        Arc::new(KabutanAdapter::with_http_client(http_client)),
        config,
    )
    .with_span(span.clone());

    let report = match today {
        Some(today) => refresher.refresh_at(today).await?,
        None => refresher.refresh().await?,
    };
    Ok(report)
}

fn refresh_config(args: &RefreshArgs) -> Result<RefreshConfig, CliError> {
    let country_code = args.country.trim().to_ascii_uppercase();
    if country_code.is_empty() {
        return Err(CliError::Config(String::from("--country must not be empty")));
    }

    let mut fetch_policy = FetchPolicyConfig::default();
    if let Some(start) = parse_date_arg("start-date", args.start_date.as_deref())? {
        fetch_policy.default_start_date = start;
    }

    Ok(RefreshConfig {
        country_code,
        fetch_policy,
        ..RefreshConfig::default()
    })
}
