use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::source_policy::SourcePolicy;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Spaces out requests to one source so that consecutive calls are at least
/// `min_interval` apart. A zero interval never waits.
///
/// The interval is a gap between calls, not a delay before the first one: a
/// fresh pacer lets its first request through immediately.
#[derive(Clone)]
pub struct RequestPacer {
    limiter: Option<Arc<DirectRateLimiter>>,
    min_interval: Duration,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval)
            .map(|quota| quota.allow_burst(NonZeroU32::MIN))
            .map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self {
            limiter,
            min_interval,
        }
    }

    /// Pacer honouring `policy.min_interval`, floored to `floor`.
    pub fn from_policy(policy: &SourcePolicy, floor: Duration) -> Self {
        Self::new(policy.min_interval.max(floor))
    }

    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next request may be sent.
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}
