//! Core of kabuka: daily stock-price acquisition and moving averages.
//!
//! This crate contains:
//! - Domain types and validation
//! - The price source contract and its Stooq and Kabutan adapters
//! - The incremental fetch policy
//! - The moving-average engine
//! - The refresh and recomputation pipelines over the warehouse

pub mod adapters;
pub mod domain;
pub mod error;
pub mod fetch_policy;
pub mod http_client;
pub mod master_data;
pub mod moving_average;
pub mod pipeline;
pub mod price_source;
pub mod source_policy;
pub mod throttling;

pub use adapters::{KabutanAdapter, StooqAdapter};
pub use domain::{parse_decimal, parse_trading_date, MaKind, MaType, PriceBar, StockCode};
pub use error::{PipelineError, ValidationError};
pub use fetch_policy::{FetchAction, FetchPolicyConfig, IncrementalFetchPolicy};
pub use http_client::{
    FixtureHttpClient, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use kabuka_warehouse::{
    CompanyRecord, IndicatorRecord, KeyColumns, MergeReport, PriceRecord, ReplaceReport, Stored,
    TableRow, Warehouse, WarehouseConfig, WarehouseError,
};
pub use master_data::{read_companies, MasterDataError};
pub use moving_average::{DateBounds, MaPoint, PricePoint};
pub use pipeline::{
    EntityOutcome, EntityStatus, IndicatorConfig, IndicatorRecomputer, IndicatorReport,
    PriceRefresher, RefreshConfig, RefreshReport,
};
pub use price_source::{PriceRequest, PriceSource, SourceError, SourceErrorKind, SourceId};
pub use source_policy::SourcePolicy;
pub use throttling::RequestPacer;
