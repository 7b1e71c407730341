//! Batch passes over the warehouse: price refresh, then indicator
//! recomputation. A refresh pass commits its merge before it returns, so a
//! following recomputation always reads a complete snapshot.

mod indicators;
mod prices;

pub use indicators::{IndicatorConfig, IndicatorRecomputer, IndicatorReport};
pub use prices::{EntityOutcome, EntityStatus, PriceRefresher, RefreshConfig, RefreshReport};
