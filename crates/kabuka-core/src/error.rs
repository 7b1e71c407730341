use thiserror::Error;

use kabuka_warehouse::WarehouseError;

/// Validation and contract errors exposed by `kabuka-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("stock code cannot be empty")]
    EmptyStockCode,
    #[error("stock code length {len} exceeds max {max}")]
    StockCodeTooLong { len: usize, max: usize },
    #[error("stock code contains invalid character '{ch}' at index {index}")]
    StockCodeInvalidChar { ch: char, index: usize },

    #[error("moving-average span must be at least 2, got {span}")]
    InvalidSpan { span: usize },
    #[error("at least one moving-average span is required")]
    EmptySpans,
    #[error("invalid indicator label '{value}', expected sma|ema|wma followed by a span")]
    InvalidIndicatorLabel { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("bar high must be >= low")]
    InvalidBarRange,

    #[error("invalid date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },
    #[error("invalid number '{value}' in field '{field}'")]
    InvalidNumber { field: &'static str, value: String },
}

/// Failure of a whole pipeline pass.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The warehouse could not apply a batch; nothing from the pass was kept.
    #[error("persistence failed: {0}")]
    Persistence(#[from] WarehouseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
