//! Point-in-time presence and aggregate online-time statistics.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rayon::prelude::*;

use crate::interval::{Interval, ReconstructConfig, reconstruct};
use crate::sample::{Sample, UserHistory};
use crate::types::UserId;

/// Answers presence questions over reconstructed intervals.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnlineDetector {
    config: ReconstructConfig,
}

impl OnlineDetector {
    pub const fn new(config: ReconstructConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &ReconstructConfig {
        &self.config
    }

    /// The user's online intervals.
    pub fn intervals(&self, history: &UserHistory) -> Vec<Interval> {
        reconstruct(history, &self.config)
    }

    /// Whether the user was online at `at` (inclusive of interval bounds).
    pub fn detect(&self, history: &UserHistory, at: DateTime<Utc>) -> bool {
        contains(&self.intervals(history), at)
    }

    /// The interval boundary nearest to `at`, preferring the earlier on ties.
    pub fn closest_online_time(
        &self,
        history: &UserHistory,
        at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.intervals(history)
            .iter()
            .flat_map(|interval| [interval.start(), interval.end()])
            .min_by_key(|boundary| ((*boundary - at).abs(), *boundary))
    }

    /// Number of users online at `at`.
    pub fn count_online(&self, histories: &HashMap<UserId, &UserHistory>, at: DateTime<Utc>) -> usize {
        histories
            .par_iter()
            .filter(|(_, history)| self.detect(history, at))
            .count()
    }

    /// Sum of all interval lengths.
    pub fn total_online_duration(&self, history: &UserHistory) -> Duration {
        self.intervals(history)
            .iter()
            .map(Interval::duration)
            .fold(Duration::zero(), |total, d| total + d)
    }

    /// Total online time divided by the number of distinct UTC days with samples.
    pub fn daily_average(&self, history: &UserHistory) -> Duration {
        let days: HashSet<NaiveDate> = history
            .samples()
            .iter()
            .map(|s| s.observed_at().date_naive())
            .collect();
        average(self.total_online_duration(history), days.len())
    }

    /// Total online time divided by the number of distinct ISO weeks with samples.
    pub fn weekly_average(&self, history: &UserHistory) -> Duration {
        let weeks: HashSet<(i32, u32)> = history
            .samples()
            .iter()
            .map(Sample::observed_at)
            .map(|at| {
                let week = at.iso_week();
                (week.year(), week.week())
            })
            .collect();
        average(self.total_online_duration(history), weeks.len())
    }
}

/// Inclusive membership over ascending, disjoint intervals.
pub(crate) fn contains(intervals: &[Interval], at: DateTime<Utc>) -> bool {
    // First interval that ends at or after `at`; only it can contain `at`.
    let idx = intervals.partition_point(|interval| interval.end() < at);
    intervals.get(idx).is_some_and(|interval| interval.contains(at))
}

fn average(total: Duration, buckets: usize) -> Duration {
    if buckets == 0 {
        return Duration::zero();
    }
    let buckets = i64::try_from(buckets).unwrap_or(i64::MAX);
    Duration::milliseconds(total.num_milliseconds() / buckets)
}
