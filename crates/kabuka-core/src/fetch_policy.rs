use std::fmt::{Display, Formatter};

use serde::Serialize;
use time::macros::date;
use time::{Date, Duration, Weekday};

use crate::StockCode;

/// What to fetch for one company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FetchAction {
    /// Nothing new can be published yet.
    Skip,
    /// Fetch the latest session from the single-day source.
    CrawlLatestDay,
    /// Fetch every session from `from` onward from the range source.
    QueryRange { from: Date },
}

impl FetchAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::CrawlLatestDay => "crawl_latest_day",
            Self::QueryRange { .. } => "query_range",
        }
    }
}

impl Display for FetchAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueryRange { from } => write!(f, "query_range(from={from})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Weekday and staleness thresholds of the fetch decision.
///
/// The defaults follow the Tokyo calendar: the range source publishes a
/// session on the next business day, so a week's Friday is only reachable
/// through the single-day source until the following Monday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicyConfig {
    pub skip_weekday: Weekday,
    pub skip_within_days: i64,
    pub crawl_weekday: Weekday,
    pub crawl_within_days: i64,
    /// First date requested for a company with no stored prices.
    pub default_start_date: Date,
}

impl Default for FetchPolicyConfig {
    fn default() -> Self {
        Self {
            skip_weekday: Weekday::Friday,
            skip_within_days: 2,
            crawl_weekday: Weekday::Thursday,
            crawl_within_days: 7,
            default_start_date: date!(2000 - 01 - 01),
        }
    }
}

/// Decides per company whether and where to fetch new prices, from its last
/// stored date alone.
#[derive(Debug, Clone, Default)]
pub struct IncrementalFetchPolicy {
    config: FetchPolicyConfig,
}

impl IncrementalFetchPolicy {
    pub fn new(config: FetchPolicyConfig) -> Self {
        Self { config }
    }

    /// Decide the fetch for `stock_code`.
    ///
    /// The weekday and age checks apply to `last_known_date` itself:
    /// - no stored date: range from `default_start_date`;
    /// - stored date is today or later: skip;
    /// - a recent Friday (age <= `skip_within_days`): skip;
    /// - a Thursday less than `crawl_within_days` old: crawl the latest day;
    /// - anything else: range from the day after the stored date.
    pub fn decide(
        &self,
        stock_code: &StockCode,
        last_known_date: Option<Date>,
        today: Date,
    ) -> FetchAction {
        let action = match last_known_date {
            None => FetchAction::QueryRange {
                from: self.config.default_start_date,
            },
            Some(last) => self.decide_after(last, today),
        };

        tracing::debug!(
            stock_code = %stock_code,
            last_known_date = ?last_known_date,
            %today,
            action = action.as_str(),
            "fetch decision"
        );
        action
    }

    fn decide_after(&self, last: Date, today: Date) -> FetchAction {
        if last >= today {
            return FetchAction::Skip;
        }

        let age = (today - last).whole_days();
        let weekday = last.weekday();

        if weekday == self.config.skip_weekday && age <= self.config.skip_within_days {
            FetchAction::Skip
        } else if weekday == self.config.crawl_weekday && age < self.config.crawl_within_days {
            FetchAction::CrawlLatestDay
        } else {
            FetchAction::QueryRange {
                from: last + Duration::days(1),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> StockCode {
        StockCode::parse("6028").expect("code")
    }

    fn decide(last: Option<Date>, today: Date) -> FetchAction {
        IncrementalFetchPolicy::default().decide(&code(), last, today)
    }

    #[test]
    fn new_company_queries_from_default_start() {
        assert_eq!(
            decide(None, date!(2020 - 03 - 02)),
            FetchAction::QueryRange {
                from: date!(2000 - 01 - 01)
            }
        );
    }

    #[test]
    fn thursday_two_days_ago_crawls_latest_day() {
        // 2020-02-27 is a Thursday.
        assert_eq!(
            decide(Some(date!(2020 - 02 - 27)), date!(2020 - 02 - 29)),
            FetchAction::CrawlLatestDay
        );
        assert_eq!(
            decide(Some(date!(2020 - 02 - 27)), date!(2020 - 03 - 04)),
            FetchAction::CrawlLatestDay
        );
    }

    #[test]
    fn recent_friday_is_skipped() {
        // 2020-02-28 is a Friday.
        assert_eq!(
            decide(Some(date!(2020 - 02 - 28)), date!(2020 - 02 - 29)),
            FetchAction::Skip
        );
        assert_eq!(
            decide(Some(date!(2020 - 02 - 28)), date!(2020 - 03 - 01)),
            FetchAction::Skip
        );
    }

    #[test]
    fn older_friday_and_thursday_fall_back_to_range() {
        assert_eq!(
            decide(Some(date!(2020 - 02 - 28)), date!(2020 - 03 - 02)),
            FetchAction::QueryRange {
                from: date!(2020 - 02 - 29)
            }
        );
        assert_eq!(
            decide(Some(date!(2020 - 02 - 27)), date!(2020 - 03 - 05)),
            FetchAction::QueryRange {
                from: date!(2020 - 02 - 28)
            }
        );
    }

    #[test]
    fn stale_monday_queries_from_the_next_day() {
        // 2020-02-17 is a Monday.
        assert_eq!(
            decide(Some(date!(2020 - 02 - 17)), date!(2020 - 02 - 27)),
            FetchAction::QueryRange {
                from: date!(2020 - 02 - 18)
            }
        );
    }

    #[test]
    fn up_to_date_company_is_skipped() {
        assert_eq!(
            decide(Some(date!(2020 - 02 - 26)), date!(2020 - 02 - 26)),
            FetchAction::Skip
        );
    }

    #[test]
    fn thresholds_are_configurable() {
        let policy = IncrementalFetchPolicy::new(FetchPolicyConfig {
            skip_within_days: 3,
            ..FetchPolicyConfig::default()
        });
        assert_eq!(
            policy.decide(&code(), Some(date!(2020 - 02 - 28)), date!(2020 - 03 - 02)),
            FetchAction::Skip
        );
    }
}
