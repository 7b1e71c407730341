//! Incremental price refresh for every company of one country.

use std::sync::Arc;

use serde::Serialize;
use time::{Date, OffsetDateTime, UtcOffset};
use tracing::Span;

use kabuka_warehouse::{
    CompanyRecord, KeyColumns, MergeReport, PriceRecord, Warehouse, WarehouseError,
};

use crate::fetch_policy::{FetchAction, FetchPolicyConfig, IncrementalFetchPolicy};
use crate::{PipelineError, PriceRequest, PriceSource, SourceError, SourceErrorKind, StockCode};

/// Settings of one refresh pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    pub country_code: String,
    /// Offset of the exchange's local time, used to determine "today".
    pub market_utc_offset: UtcOffset,
    pub fetch_policy: FetchPolicyConfig,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            country_code: String::from("JP"),
            market_utc_offset: time::macros::offset!(+9),
            fetch_policy: FetchPolicyConfig::default(),
        }
    }
}

impl RefreshConfig {
    pub fn today(&self) -> Date {
        OffsetDateTime::now_utc()
            .to_offset(self.market_utc_offset)
            .date()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Fetched,
    Skipped,
    /// The source was queried but had nothing after the stored history.
    NoNewData,
    Failed,
}

/// Result of refreshing one company.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityOutcome {
    pub stock_code: String,
    pub company_id: Option<String>,
    pub action: Option<FetchAction>,
    pub status: EntityStatus,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EntityOutcome {
    fn failed(stock_code: &str, company_id: Option<String>, code: &str, message: String) -> Self {
        Self {
            stock_code: stock_code.to_owned(),
            company_id,
            action: None,
            status: EntityStatus::Failed,
            rows: 0,
            error_code: Some(code.to_owned()),
            message: Some(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub country_code: String,
    pub today: Date,
    pub targets: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub no_new_data: usize,
    pub failed: usize,
    pub merge: MergeReport,
    pub entities: Vec<EntityOutcome>,
}

/// Refreshes stored prices: fetch decision per company, then one merge of
/// everything fetched.
pub struct PriceRefresher {
    warehouse: Warehouse,
    policy: IncrementalFetchPolicy,
    range_source: Arc<dyn PriceSource>,
    latest_day_source: Arc<dyn PriceSource>,
    config: RefreshConfig,
    span: Span,
}

impl PriceRefresher {
    pub fn new(
        warehouse: Warehouse,
        range_source: Arc<dyn PriceSource>,
        latest_day_source: Arc<dyn PriceSource>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            warehouse,
            policy: IncrementalFetchPolicy::new(config.fetch_policy.clone()),
            range_source,
            latest_day_source,
            config,
            span: Span::none(),
        }
    }

    /// Log inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn refresh(&self) -> Result<RefreshReport, PipelineError> {
        self.refresh_at(self.config.today()).await
    }

    /// Refresh as if the market date were `today`.
    ///
    /// Source failures and master-data lookup failures are recorded per
    /// company and do not stop the pass. A storage failure aborts it and
    /// nothing fetched in the pass is kept.
    pub async fn refresh_at(&self, today: Date) -> Result<RefreshReport, PipelineError> {
        let country_code = self.config.country_code.as_str();
        let targets = self.warehouse.companies_in_country(country_code)?;
        tracing::info!(
            parent: &self.span,
            country_code,
            %today,
            targets = targets.len(),
            "price refresh started"
        );

        let mut records: Vec<PriceRecord> = Vec::new();
        let mut entities = Vec::with_capacity(targets.len());
        for company in &targets {
            let outcome = self.refresh_company(company, today, &mut records).await?;
            entities.push(outcome);
        }

        let keys = KeyColumns::<PriceRecord>::resolve(&["company_id", "trade_date"])?;
        let merge = self.warehouse.bulk_merge(&records, &keys)?;

        let count = |status: EntityStatus| entities.iter().filter(|e| e.status == status).count();
        let (fetched, skipped, no_new_data, failed) = (
            count(EntityStatus::Fetched),
            count(EntityStatus::Skipped),
            count(EntityStatus::NoNewData),
            count(EntityStatus::Failed),
        );
        let report = RefreshReport {
            country_code: country_code.to_owned(),
            today,
            targets: targets.len(),
            fetched,
            skipped,
            no_new_data,
            failed,
            merge,
            entities,
        };
        tracing::info!(
            parent: &self.span,
            fetched = report.fetched,
            skipped = report.skipped,
            no_new_data = report.no_new_data,
            failed = report.failed,
            updated = merge.updated,
            inserted = merge.inserted,
            "price refresh finished"
        );
        Ok(report)
    }

    async fn refresh_company(
        &self,
        company: &CompanyRecord,
        today: Date,
        records: &mut Vec<PriceRecord>,
    ) -> Result<EntityOutcome, PipelineError> {
        let raw_code = company.stock_code.as_str();
        let stock_code = match StockCode::parse(raw_code) {
            Ok(code) => code,
            Err(error) => {
                tracing::warn!(parent: &self.span, stock_code = raw_code, %error, "invalid stock code");
                return Ok(EntityOutcome::failed(
                    raw_code,
                    None,
                    "validation.stock_code",
                    error.to_string(),
                ));
            }
        };

        let company_id = match self
            .warehouse
            .company_id_for(stock_code.as_str(), &self.config.country_code)
        {
            Ok(id) => id,
            Err(error @ WarehouseError::LookupFailed { .. }) => {
                tracing::error!(parent: &self.span, stock_code = %stock_code, %error, "company lookup failed");
                return Ok(EntityOutcome::failed(
                    raw_code,
                    None,
                    "warehouse.lookup_failed",
                    error.to_string(),
                ));
            }
            Err(error) => return Err(error.into()),
        };

        let last_known_date = self.warehouse.latest_price_date(&company_id)?;
        let action = self.policy.decide(&stock_code, last_known_date, today);
        tracing::info!(
            parent: &self.span,
            stock_code = %stock_code,
            company_id = company_id.as_str(),
            action = action.as_str(),
            "fetch decision"
        );

        let fetched = match action {
            FetchAction::Skip => {
                return Ok(EntityOutcome {
                    stock_code: raw_code.to_owned(),
                    company_id: Some(company_id),
                    action: Some(action),
                    status: EntityStatus::Skipped,
                    rows: 0,
                    error_code: None,
                    message: None,
                });
            }
            FetchAction::CrawlLatestDay => {
                self.fetch(self.latest_day_source.as_ref(), &stock_code, today, today)
                    .await
            }
            FetchAction::QueryRange { from } => {
                self.fetch(self.range_source.as_ref(), &stock_code, from, today)
                    .await
            }
        };

        match fetched {
            Ok(bars) => {
                let rows = bars.len();
                tracing::info!(
                    parent: &self.span,
                    stock_code = %stock_code,
                    company_id = company_id.as_str(),
                    rows,
                    "fetched prices"
                );
                records.extend(bars.into_iter().map(|bar| bar.into_record(&company_id)));
                Ok(EntityOutcome {
                    stock_code: raw_code.to_owned(),
                    company_id: Some(company_id),
                    action: Some(action),
                    status: EntityStatus::Fetched,
                    rows,
                    error_code: None,
                    message: None,
                })
            }
            Err(error) if error.kind() == SourceErrorKind::NotFound && last_known_date.is_some() => {
                // Holidays and weekends after the stored history leave the source empty.
                tracing::info!(
                    parent: &self.span,
                    stock_code = %stock_code,
                    company_id = company_id.as_str(),
                    message = error.message(),
                    "no new prices"
                );
                Ok(EntityOutcome {
                    stock_code: raw_code.to_owned(),
                    company_id: Some(company_id),
                    action: Some(action),
                    status: EntityStatus::NoNewData,
                    rows: 0,
                    error_code: Some(error.code().to_owned()),
                    message: Some(error.message().to_owned()),
                })
            }
            Err(error) => {
                tracing::warn!(
                    parent: &self.span,
                    stock_code = %stock_code,
                    company_id = company_id.as_str(),
                    code = error.code(),
                    message = error.message(),
                    "price fetch failed"
                );
                let mut outcome =
                    EntityOutcome::failed(raw_code, Some(company_id), error.code(), error.message().to_owned());
                outcome.action = Some(action);
                Ok(outcome)
            }
        }
    }

    async fn fetch(
        &self,
        source: &dyn PriceSource,
        stock_code: &StockCode,
        from: Date,
        to: Date,
    ) -> Result<Vec<crate::PriceBar>, SourceError> {
        let request = PriceRequest::new(stock_code.clone(), from, to)?;
        tracing::debug!(parent: &self.span, source = %source.id(), stock_code = %stock_code, %from, %to, "requesting prices");
        source.fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PriceBar, SourceId};
    use kabuka_warehouse::WarehouseConfig;
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use time::macros::date;

    /// Source answering from a per-code table and recording requests.
    struct ScriptedSource {
        id: SourceId,
        answers: HashMap<String, Result<Vec<PriceBar>, SourceError>>,
        calls: Mutex<Vec<PriceRequest>>,
    }

    impl ScriptedSource {
        fn new(id: SourceId) -> Self {
            Self {
                id,
                answers: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn answer(mut self, code: &str, answer: Result<Vec<PriceBar>, SourceError>) -> Self {
            self.answers.insert(code.to_owned(), answer);
            self
        }

        fn calls(&self) -> Vec<PriceRequest> {
            self.calls.lock().expect("calls").clone()
        }
    }

    impl PriceSource for ScriptedSource {
        fn id(&self) -> SourceId {
            self.id
        }

        fn fetch<'a>(
            &'a self,
            req: PriceRequest,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<PriceBar>, SourceError>> + Send + 'a>> {
            Box::pin(async move {
                let answer = self
                    .answers
                    .get(req.stock_code.as_str())
                    .cloned()
                    .unwrap_or_else(|| Err(SourceError::not_found("unscripted")));
                self.calls.lock().expect("calls").push(req);
                answer
            })
        }
    }

    fn bar(trade_date: Date, close: f64) -> PriceBar {
        PriceBar::new(trade_date, close, close + 1.0, close - 1.0, close, 100.0).expect("bar")
    }

    fn company(company_id: &str, stock_code: &str) -> CompanyRecord {
        CompanyRecord {
            company_id: company_id.to_owned(),
            company_name: format!("Company {company_id}"),
            stock_code: stock_code.to_owned(),
            country_code: String::from("JP"),
            listed_market: String::from("TSE"),
            foundation_date: None,
            longitude: None,
            latitude: None,
        }
    }

    fn warehouse(dir: &std::path::Path) -> Warehouse {
        Warehouse::open(WarehouseConfig {
            kabuka_home: dir.to_path_buf(),
            db_path: dir.join("warehouse.duckdb"),
            max_pool_size: 2,
        })
        .expect("warehouse")
    }

    #[tokio::test]
    async fn source_failure_is_recorded_and_the_batch_continues() {
        let temp = tempdir().expect("tempdir");
        let warehouse = warehouse(temp.path());
        warehouse
            .upsert_companies(&[company("0001", "6028"), company("0002", "7974")])
            .expect("companies");

        let range = Arc::new(
            ScriptedSource::new(SourceId::Stooq)
                .answer("6028", Err(SourceError::unavailable("timeout")))
                .answer("7974", Ok(vec![bar(date!(2020 - 02 - 26), 10.0), bar(date!(2020 - 02 - 27), 11.0)])),
        );
        let latest = Arc::new(ScriptedSource::new(SourceId::Kabutan));
        let refresher = PriceRefresher::new(warehouse.clone(), range.clone(), latest, RefreshConfig::default());

        let report = refresher.refresh_at(date!(2020 - 02 - 28)).await.expect("refresh");

        assert_eq!(report.targets, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.merge, MergeReport { updated: 0, inserted: 2 });
        assert_eq!(report.entities[0].error_code.as_deref(), Some("source.unavailable"));
        assert_eq!(warehouse.price_history("0002").expect("history").len(), 2);
        assert_eq!(range.calls()[0].from, date!(2000 - 01 - 01));
    }

    #[tokio::test]
    async fn thursday_history_is_completed_from_the_latest_day_source() {
        let temp = tempdir().expect("tempdir");
        let warehouse = warehouse(temp.path());
        warehouse.upsert_companies(&[company("0001", "6028")]).expect("companies");
        let keys = KeyColumns::<PriceRecord>::resolve(&["company_id", "trade_date"]).expect("keys");
        warehouse
            .bulk_merge(&[bar(date!(2020 - 02 - 27), 10.0).into_record("0001")], &keys)
            .expect("seed");

        let range = Arc::new(ScriptedSource::new(SourceId::Stooq));
        let latest = Arc::new(
            ScriptedSource::new(SourceId::Kabutan).answer("6028", Ok(vec![bar(date!(2020 - 02 - 28), 12.0)])),
        );
        let refresher = PriceRefresher::new(warehouse.clone(), range.clone(), latest.clone(), RefreshConfig::default());

        let report = refresher.refresh_at(date!(2020 - 02 - 29)).await.expect("refresh");

        assert_eq!(report.entities[0].action, Some(FetchAction::CrawlLatestDay));
        assert!(range.calls().is_empty());
        assert_eq!(latest.calls().len(), 1);
        assert_eq!(
            warehouse.latest_price_date("0001").expect("latest"),
            Some(date!(2020 - 02 - 28))
        );
    }

    #[tokio::test]
    async fn ambiguous_stock_code_fails_only_that_company() {
        let temp = tempdir().expect("tempdir");
        let warehouse = warehouse(temp.path());
        warehouse
            .upsert_companies(&[company("0001", "6028"), company("0002", "6028"), company("0003", "7974")])
            .expect("companies");

        let range = Arc::new(
            ScriptedSource::new(SourceId::Stooq)
                .answer("7974", Ok(vec![bar(date!(2020 - 02 - 27), 11.0)])),
        );
        let refresher = PriceRefresher::new(
            warehouse,
            range,
            Arc::new(ScriptedSource::new(SourceId::Kabutan)),
            RefreshConfig::default(),
        );

        let report = refresher.refresh_at(date!(2020 - 02 - 28)).await.expect("refresh");

        assert_eq!(report.failed, 2);
        assert_eq!(report.fetched, 1);
        assert!(report
            .entities
            .iter()
            .filter(|e| e.stock_code == "6028")
            .all(|e| e.error_code.as_deref() == Some("warehouse.lookup_failed")));
    }

    #[tokio::test]
    async fn friday_history_is_skipped_without_calling_sources() {
        let temp = tempdir().expect("tempdir");
        let warehouse = warehouse(temp.path());
        warehouse.upsert_companies(&[company("0001", "6028")]).expect("companies");
        let keys = KeyColumns::<PriceRecord>::resolve(&["company_id", "trade_date"]).expect("keys");
        warehouse
            .bulk_merge(&[bar(date!(2020 - 02 - 28), 10.0).into_record("0001")], &keys)
            .expect("seed");

        let range = Arc::new(ScriptedSource::new(SourceId::Stooq));
        let latest = Arc::new(ScriptedSource::new(SourceId::Kabutan));
        let refresher = PriceRefresher::new(warehouse, range.clone(), latest.clone(), RefreshConfig::default());

        let report = refresher.refresh_at(date!(2020 - 02 - 29)).await.expect("refresh");

        assert_eq!(report.skipped, 1);
        assert_eq!(report.merge, MergeReport::default());
        assert!(range.calls().is_empty());
        assert!(latest.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_range_after_stored_history_is_not_a_failure() {
        let temp = tempdir().expect("tempdir");
        let warehouse = warehouse(temp.path());
        warehouse
            .upsert_companies(&[company("0001", "6028"), company("0002", "7974")])
            .expect("companies");
        let keys = KeyColumns::<PriceRecord>::resolve(&["company_id", "trade_date"]).expect("keys");
        warehouse
            .bulk_merge(&[bar(date!(2020 - 02 - 28), 10.0).into_record("0001")], &keys)
            .expect("seed");

        let range = Arc::new(
            ScriptedSource::new(SourceId::Stooq)
                .answer("6028", Err(SourceError::not_found("no rows in range")))
                .answer("7974", Err(SourceError::not_found("No data"))),
        );
        let refresher = PriceRefresher::new(
            warehouse,
            range.clone(),
            Arc::new(ScriptedSource::new(SourceId::Kabutan)),
            RefreshConfig::default(),
        );

        let report = refresher.refresh_at(date!(2020 - 03 - 02)).await.expect("refresh");

        assert_eq!(range.calls()[0].from, date!(2020 - 02 - 29));
        assert_eq!(report.no_new_data, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.entities[0].status, EntityStatus::NoNewData);
        assert_eq!(report.entities[0].error_code.as_deref(), Some("source.not_found"));
        assert_eq!(report.entities[1].status, EntityStatus::Failed);
    }
}
