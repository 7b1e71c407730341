//! Range source backed by the Stooq daily CSV download.
//!
//! Stooq publishes a trading day's prices on the following business day, so
//! the newest row it returns lags the exchange by one session.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use time::macros::format_description;
use time::Date;

use super::{status_error, transport_error};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::price_source::normalize_bars;
use crate::source_policy::SourcePolicy;
use crate::throttling::RequestPacer;
use crate::{
    parse_trading_date, PriceBar, PriceRequest, PriceSource, SourceError, SourceId,
};

const BASE_URL: &str = "https://stooq.com/q/d/l/";

#[derive(Clone)]
pub struct StooqAdapter {
    http_client: Arc<dyn HttpClient>,
    policy: SourcePolicy,
    pacer: RequestPacer,
    market_suffix: String,
}

impl Default for StooqAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()))
    }
}

impl StooqAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_policy(http_client, SourcePolicy::stooq_default())
    }

    pub fn with_policy(http_client: Arc<dyn HttpClient>, policy: SourcePolicy) -> Self {
        let pacer = RequestPacer::new(policy.min_interval);
        Self {
            http_client,
            policy,
            pacer,
            market_suffix: String::from("jp"),
        }
    }

    /// Exchange suffix appended to the stock code, `jp` by default.
    pub fn with_market_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.market_suffix = suffix.into().to_ascii_lowercase();
        self
    }

    fn endpoint(&self, req: &PriceRequest) -> Result<String, SourceError> {
        let compact = format_description!("[year][month][day]");
        let d1 = req
            .from
            .format(compact)
            .map_err(|e| SourceError::invalid_request(format!("cannot format start date: {e}")))?;
        let d2 = req
            .to
            .format(compact)
            .map_err(|e| SourceError::invalid_request(format!("cannot format end date: {e}")))?;
        let symbol = format!(
            "{}.{}",
            req.stock_code.as_str().to_ascii_lowercase(),
            self.market_suffix
        );

        Ok(format!(
            "{BASE_URL}?s={}&d1={d1}&d2={d2}&i=d",
            urlencoding::encode(&symbol)
        ))
    }
}

impl PriceSource for StooqAdapter {
    fn id(&self) -> SourceId {
        SourceId::Stooq
    }

    fn fetch<'a>(
        &'a self,
        req: PriceRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PriceBar>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let request = HttpRequest::get(self.endpoint(&req)?).with_timeout(self.policy.timeout);

            self.pacer.ready().await;
            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|error| transport_error("stooq", &error))?;
            if !response.is_success() {
                return Err(status_error("stooq", response.status));
            }

            let bars = parse_daily_csv(&response.body)?
                .into_iter()
                .filter(|bar| bar.trade_date >= req.from && bar.trade_date <= req.to)
                .collect::<Vec<_>>();
            if bars.is_empty() {
                return Err(SourceError::not_found(format!(
                    "stooq has no prices for {} between {} and {}",
                    req.stock_code, req.from, req.to
                )));
            }

            Ok(bars)
        })
    }
}

#[derive(Debug, Deserialize)]
struct StooqRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume", default)]
    volume: Option<f64>,
}

/// Parse a Stooq `Date,Open,High,Low,Close,Volume` download.
fn parse_daily_csv(body: &str) -> Result<Vec<PriceBar>, SourceError> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("no data") {
        return Ok(Vec::new());
    }
    if !trimmed.starts_with("Date") {
        let first_line = trimmed.lines().next().unwrap_or_default();
        return Err(SourceError::unavailable(format!(
            "stooq answered with a non-CSV body: '{first_line}'"
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(trimmed.as_bytes());

    let mut bars = Vec::new();
    for record in reader.deserialize::<StooqRow>() {
        let row = record.map_err(|e| SourceError::parse(format!("invalid stooq row: {e}")))?;
        let trade_date: Date = parse_trading_date(&row.date)?;
        bars.push(PriceBar::new(
            trade_date,
            row.open,
            row.high,
            row.low,
            row.close,
            row.volume.unwrap_or(0.0),
        )?);
    }

    Ok(normalize_bars(bars))
}
