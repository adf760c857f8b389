//! Session-length spread within a time window.

use chrono::{DateTime, Duration, Utc};

use crate::detector::OnlineDetector;
use crate::interval::Interval;
use crate::sample::UserHistory;

/// Shortest and longest online stretch inside a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MinMax {
    pub min: Duration,
    pub max: Duration,
}

/// Per-window extremal session statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeStatsCalculator {
    detector: OnlineDetector,
}

impl RangeStatsCalculator {
    pub const fn new(detector: OnlineDetector) -> Self {
        Self { detector }
    }

    /// Min and max clipped interval duration over `[from, to)`.
    ///
    /// Returns zeros when no interval intersects the window.
    pub fn calculate_min_max(
        &self,
        history: &UserHistory,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> MinMax {
        min_max(&self.detector.intervals(history), from, to)
    }
}

fn min_max(intervals: &[Interval], from: DateTime<Utc>, to: DateTime<Utc>) -> MinMax {
    if from >= to {
        return MinMax::default();
    }

    intervals
        .iter()
        .filter(|interval| interval.start() < to && interval.end() >= from)
        .map(|interval| interval.end().min(to) - interval.start().max(from))
        .fold(None, |acc: Option<MinMax>, clipped| {
            Some(acc.map_or(
                MinMax {
                    min: clipped,
                    max: clipped,
                },
                |acc| MinMax {
                    min: acc.min.min(clipped),
                    max: acc.max.max(clipped),
                },
            ))
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::ReconstructConfig;
    use crate::sample::Sample;
    use chrono::TimeZone;

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn calculator() -> RangeStatsCalculator {
        RangeStatsCalculator::new(OnlineDetector::new(ReconstructConfig {
            staleness_threshold: Duration::minutes(8),
        }))
    }

    /// Sessions [0, 10], [30, 35] and [60, 80].
    fn history() -> UserHistory {
        UserHistory::from_samples(
            [0, 5, 10, 30, 35, 60, 65, 70, 75, 80]
                .into_iter()
                .map(|m| Sample::active_at(ts(m))),
        )
    }

    #[test]
    fn test_window_without_intervals_is_zero() {
        let stats = calculator().calculate_min_max(&history(), ts(12), ts(28));
        assert_eq!(stats, MinMax::default());
    }

    #[test]
    fn test_empty_history_is_zero() {
        let stats = calculator().calculate_min_max(&UserHistory::new(), ts(0), ts(100));
        assert_eq!(stats, MinMax::default());
    }

    #[test]
    fn test_window_containing_one_interval() {
        let stats = calculator().calculate_min_max(&history(), ts(20), ts(50));
        assert_eq!(
            stats,
            MinMax {
                min: Duration::minutes(5),
                max: Duration::minutes(5),
            }
        );
    }

    #[test]
    fn test_spread_across_sessions() {
        let stats = calculator().calculate_min_max(&history(), ts(-5), ts(100));
        assert_eq!(stats.min, Duration::minutes(5));
        assert_eq!(stats.max, Duration::minutes(20));
    }

    #[test]
    fn test_intervals_are_clipped_to_window() {
        let stats = calculator().calculate_min_max(&history(), ts(7), ts(70));
        assert_eq!(stats.min, Duration::minutes(3));
        assert_eq!(stats.max, Duration::minutes(10));
    }

    #[test]
    fn test_window_end_is_exclusive() {
        // The session starting exactly at 30 does not intersect [12, 30).
        let stats = calculator().calculate_min_max(&history(), ts(12), ts(30));
        assert_eq!(stats, MinMax::default());
    }

    #[test]
    fn test_reversed_window_is_zero() {
        let stats = calculator().calculate_min_max(&history(), ts(50), ts(0));
        assert_eq!(stats, MinMax::default());
    }
}
