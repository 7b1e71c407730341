use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{PriceBar, StockCode, ValidationError};

/// Identifier of a price source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    /// Daily history over a date range.
    Stooq,
    /// Latest published trading day only.
    Kabutan,
}

impl SourceId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stooq => "stooq",
            Self::Kabutan => "kabutan",
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Unavailable,
    NotFound,
    Parse,
    InvalidRequest,
}

/// Structured failure of one source call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Parse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::Parse => "source.parse",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(value: ValidationError) -> Self {
        Self::parse(value.to_string())
    }
}

/// Request for one company's daily prices.
///
/// Range sources honour `from`/`to` inclusively; the single-day source
/// ignores both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub stock_code: StockCode,
    pub from: Date,
    pub to: Date,
}

impl PriceRequest {
    pub fn new(stock_code: StockCode, from: Date, to: Date) -> Result<Self, SourceError> {
        if from > to {
            return Err(SourceError::invalid_request(format!(
                "price request range is inverted: {from} > {to}"
            )));
        }
        Ok(Self {
            stock_code,
            from,
            to,
        })
    }
}

/// A daily price source.
///
/// A successful fetch returns rows sorted by date ascending, at most one per
/// date. A range source may return many rows; the single-day source returns
/// at most one.
pub trait PriceSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// # Errors
    ///
    /// Returns [`SourceError`] when the remote is unreachable, answers with a
    /// failure status, has no data for the code, or the payload cannot be
    /// parsed.
    fn fetch<'a>(
        &'a self,
        req: PriceRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PriceBar>, SourceError>> + Send + 'a>>;
}

/// Sort by date and keep the last row for any repeated date.
pub(crate) fn normalize_bars(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.sort_by_key(|bar| bar.trade_date);
    let mut normalized: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match normalized.last_mut() {
            Some(last) if last.trade_date == bar.trade_date => *last = bar,
            _ => normalized.push(bar),
        }
    }
    normalized
}
