//! Full recomputation of the moving-average table.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::Span;

use kabuka_warehouse::{IndicatorRecord, KeyColumns, ReplaceReport, Warehouse};

use crate::moving_average::{self, DateBounds, PricePoint};
use crate::{MaKind, MaType, PipelineError, ValidationError};

/// Spans computed for every algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorConfig {
    pub spans: Vec<usize>,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            spans: vec![5, 25, 75],
        }
    }
}

impl IndicatorConfig {
    /// Every algorithm crossed with every distinct span, in that order.
    ///
    /// A span listed more than once is computed once, at its first position.
    pub fn ma_types(&self) -> Result<Vec<MaType>, ValidationError> {
        if self.spans.is_empty() {
            return Err(ValidationError::EmptySpans);
        }

        let mut seen = BTreeSet::new();
        let spans = self
            .spans
            .iter()
            .copied()
            .filter(|span| seen.insert(*span))
            .collect::<Vec<_>>();

        let mut types = Vec::with_capacity(MaKind::ALL.len() * spans.len());
        for kind in MaKind::ALL {
            for &span in &spans {
                types.push(MaType::new(kind, span)?);
            }
        }
        Ok(types)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorReport {
    pub companies: usize,
    /// Rows produced per indicator label.
    pub rows_by_type: BTreeMap<String, usize>,
    pub replace: ReplaceReport,
}

/// Rebuilds `stock_price_ma` from the stored price history of every company.
pub struct IndicatorRecomputer {
    warehouse: Warehouse,
    config: IndicatorConfig,
    bounds: DateBounds,
    span: Span,
}

impl IndicatorRecomputer {
    pub fn new(warehouse: Warehouse, config: IndicatorConfig) -> Self {
        Self {
            warehouse,
            config,
            bounds: DateBounds::unbounded(),
            span: Span::none(),
        }
    }

    /// Keep only values dated inside `bounds`.
    pub fn with_bounds(mut self, bounds: DateBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Log inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Compute every configured indicator for every company with prices and
    /// replace the indicator table with the result in one transaction.
    pub fn recompute(&self) -> Result<IndicatorReport, PipelineError> {
        let ma_types = self.config.ma_types()?;
        let company_ids = self.warehouse.companies_with_prices()?;
        tracing::info!(
            parent: &self.span,
            companies = company_ids.len(),
            types = ma_types.len(),
            "indicator recomputation started"
        );

        let mut records = Vec::new();
        let mut rows_by_type: BTreeMap<String, usize> =
            ma_types.iter().map(|ma_type| (ma_type.label(), 0)).collect();

        for company_id in &company_ids {
            let history = self
                .warehouse
                .price_history(company_id)?
                .iter()
                .map(|stored| PricePoint::from(&stored.row))
                .collect::<Vec<_>>();

            for &ma_type in &ma_types {
                let label = ma_type.label();
                let points = moving_average::compute(ma_type, &history, self.bounds);
                if let Some(count) = rows_by_type.get_mut(&label) {
                    *count += points.len();
                }
                records.extend(points.into_iter().map(|point| IndicatorRecord {
                    company_id: company_id.clone(),
                    trade_date: point.trade_date,
                    ma_type: label.clone(),
                    ma_value: point.value,
                }));
            }
        }

        for (ma_type, rows) in &rows_by_type {
            tracing::info!(parent: &self.span, ma_type = ma_type.as_str(), rows, "computed indicator");
        }

        let keys = KeyColumns::<IndicatorRecord>::resolve(&["company_id", "trade_date", "ma_type"])?;
        let replace = self.warehouse.bulk_replace(&records, &keys)?;

        tracing::info!(
            parent: &self.span,
            companies = company_ids.len(),
            deleted = replace.deleted,
            inserted = replace.inserted,
            "indicator recomputation finished"
        );
        Ok(IndicatorReport {
            companies: company_ids.len(),
            rows_by_type,
            replace,
        })
    }
}
