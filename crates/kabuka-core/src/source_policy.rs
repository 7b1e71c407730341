use std::time::Duration;

use crate::SourceId;

/// Minimum spacing between requests to the Kabutan site.
pub const MIN_SCRAPE_INTERVAL: Duration = Duration::from_secs(1);

/// Request pacing and timeout settings for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePolicy {
    pub source_id: SourceId,
    /// Minimum delay between consecutive requests; zero disables pacing.
    pub min_interval: Duration,
    pub timeout: Duration,
}

impl SourcePolicy {
    pub fn stooq_default() -> Self {
        Self {
            source_id: SourceId::Stooq,
            min_interval: Duration::ZERO,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn kabutan_default() -> Self {
        Self {
            source_id: SourceId::Kabutan,
            min_interval: MIN_SCRAPE_INTERVAL,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn default_for(source_id: SourceId) -> Self {
        match source_id {
            SourceId::Stooq => Self::stooq_default(),
            SourceId::Kabutan => Self::kabutan_default(),
        }
    }
}
