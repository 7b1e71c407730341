//! Simple, exponential and weighted moving averages over a daily close series.
//!
//! Every function takes one company's history sorted by date ascending and
//! emits one point per date whose span requirement is met. Positions count
//! stored observations, not calendar days: a missing trading day shifts the
//! window instead of leaving a gap.

use serde::Serialize;
use time::Date;

use kabuka_warehouse::PriceRecord;

use crate::{MaKind, MaType};

/// One close observation fed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub trade_date: Date,
    pub close: f64,
}

impl From<&PriceRecord> for PricePoint {
    fn from(value: &PriceRecord) -> Self {
        Self {
            trade_date: value.trade_date,
            close: value.close,
        }
    }
}

/// One computed moving-average value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaPoint {
    pub trade_date: Date,
    pub value: f64,
}

/// Inclusive output window. Values are always computed over the full history
/// first, so clipping never changes a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateBounds {
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl DateBounds {
    pub const fn unbounded() -> Self {
        Self {
            from: None,
            to: None,
        }
    }

    pub fn contains(&self, date: Date) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

/// Compute `ma_type` over `history` and keep the points inside `bounds`.
pub fn compute(ma_type: MaType, history: &[PricePoint], bounds: DateBounds) -> Vec<MaPoint> {
    debug_assert!(
        history.windows(2).all(|pair| pair[0].trade_date < pair[1].trade_date),
        "history must be strictly ascending by date"
    );

    let points = match ma_type.kind() {
        MaKind::Sma => sma(history, ma_type.span()),
        MaKind::Ema => ema(history, ma_type.span()),
        MaKind::Wma => wma(history, ma_type.span()),
    };
    points
        .into_iter()
        .filter(|point| bounds.contains(point.trade_date))
        .collect()
}

/// Arithmetic mean of the `span` closes ending at each position.
pub fn sma(history: &[PricePoint], span: usize) -> Vec<MaPoint> {
    if span == 0 {
        return Vec::new();
    }

    history
        .windows(span)
        .map(|window| {
            let sum: f64 = window.iter().map(|point| point.close).sum();
            MaPoint {
                trade_date: window[span - 1].trade_date,
                value: sum / span as f64,
            }
        })
        .collect()
}

/// Exponential average with `alpha = 2 / (span + 1)` seeded by the first close.
///
/// The first `span - 1` values feed the recurrence but are not emitted.
pub fn ema(history: &[PricePoint], span: usize) -> Vec<MaPoint> {
    let Some(first) = history.first() else {
        return Vec::new();
    };
    if span == 0 {
        return Vec::new();
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut previous = first.close;
    let mut points = Vec::with_capacity(history.len().saturating_sub(span - 1));

    for (position, point) in history.iter().enumerate() {
        let value = if position == 0 {
            previous
        } else {
            alpha * point.close + (1.0 - alpha) * previous
        };
        previous = value;

        if position + 1 >= span {
            points.push(MaPoint {
                trade_date: point.trade_date,
                value,
            });
        }
    }

    points
}

/// Linearly weighted average over full windows of `span` closes; the newest
/// close weighs `span`, the oldest weighs 1.
pub fn wma(history: &[PricePoint], span: usize) -> Vec<MaPoint> {
    if span == 0 {
        return Vec::new();
    }

    let denominator = (span * (span + 1) / 2) as f64;
    history
        .windows(span)
        .map(|window| {
            let weighted: f64 = window
                .iter()
                .enumerate()
                .map(|(offset, point)| (offset + 1) as f64 * point.close)
                .sum();
            MaPoint {
                trade_date: window[span - 1].trade_date,
                value: weighted / denominator,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn history(closes: &[f64]) -> Vec<PricePoint> {
        let start = date!(2020 - 02 - 03);
        closes
            .iter()
            .enumerate()
            .map(|(offset, close)| PricePoint {
                trade_date: start + time::Duration::days(offset as i64),
                close: *close,
            })
            .collect()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn sma_averages_each_full_window() {
        let points = sma(&history(&[10.0, 20.0, 30.0, 40.0]), 3);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].trade_date, date!(2020 - 02 - 05));
        assert_close(points[0].value, 20.0);
        assert_close(points[1].value, 30.0);
    }

    #[test]
    fn ema_seeds_with_first_close_and_suppresses_warm_up() {
        let points = ema(&history(&[10.0, 20.0, 30.0]), 2);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].trade_date, date!(2020 - 02 - 04));
        assert_close(points[0].value, 2.0 / 3.0 * 20.0 + 1.0 / 3.0 * 10.0);
        assert_close(points[1].value, 2.0 / 3.0 * 30.0 + 1.0 / 3.0 * (50.0 / 3.0));
        assert!((points[1].value - 25.56).abs() < 0.01);
    }

    #[test]
    fn wma_weights_newest_close_most() {
        let points = wma(&history(&[10.0, 20.0, 30.0]), 3);

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].trade_date, date!(2020 - 02 - 05));
        assert_close(points[0].value, 140.0 / 6.0);
    }

    #[test]
    fn short_history_produces_nothing() {
        let short = history(&[10.0, 20.0, 30.0, 40.0]);
        for kind in MaKind::ALL {
            let ma_type = MaType::new(kind, 5).expect("span");
            assert!(compute(ma_type, &short, DateBounds::unbounded()).is_empty());
        }
        assert!(ema(&[], 2).is_empty());
    }

    #[test]
    fn recomputation_is_deterministic() {
        let series = history(&[3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0]);
        for kind in MaKind::ALL {
            let ma_type = MaType::new(kind, 3).expect("span");
            assert_eq!(
                compute(ma_type, &series, DateBounds::unbounded()),
                compute(ma_type, &series, DateBounds::unbounded())
            );
        }
    }

    #[test]
    fn bounds_clip_output_without_changing_values() {
        let series = history(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let ma_type = MaType::new(MaKind::Ema, 2).expect("span");

        let full = compute(ma_type, &series, DateBounds::unbounded());
        let clipped = compute(
            ma_type,
            &series,
            DateBounds {
                from: Some(date!(2020 - 02 - 06)),
                to: None,
            },
        );

        assert_eq!(clipped.len(), 2);
        assert_eq!(clipped[..], full[full.len() - 2..]);
    }
}
