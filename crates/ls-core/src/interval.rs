//! Online interval reconstruction.
//!
//! Converts the sparse poll samples of one user into the spans during which
//! the user is considered online.
//!
//! # Algorithm Summary
//!
//! Every sample proves the user was online at its `last_active` instant. A
//! sample is *fresh* when `observed_at - last_active <= Δ` (the staleness
//! threshold); a fresh sample also proves presence up to the poll itself.
//!
//! 1. Walk the samples in poll order, keeping one open span
//! 2. A sample continues the span when it was polled within Δ of the previous
//!    poll and its `last_active` is within Δ of the span end, or when its
//!    `last_active` already lies inside the span
//! 3. Continuing samples extend the span end to their reach (`observed_at`
//!    when fresh, `last_active` otherwise)
//! 4. Anything else closes the span and opens a new one at `last_active`

use chrono::{DateTime, Duration, Utc};

use crate::sample::{Sample, UserHistory};

/// Nominal upstream refresh interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::seconds(30);

/// Multiplier applied to the refresh interval to get the staleness threshold.
pub const DEFAULT_STALENESS_TOLERANCE: f64 = 1.5;

/// Configuration for interval reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconstructConfig {
    /// Maximum gap between samples still considered continuous presence.
    /// Default: 45 seconds (30 s refresh x 1.5).
    pub staleness_threshold: Duration,
}

impl ReconstructConfig {
    /// Derives the threshold from a refresh interval and tolerance factor.
    ///
    /// Non-finite or negative tolerances fall back to the default factor.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn from_refresh_interval(interval: Duration, tolerance: f64) -> Self {
        let tolerance = if tolerance.is_finite() && tolerance >= 0.0 {
            tolerance
        } else {
            DEFAULT_STALENESS_TOLERANCE
        };
        let millis = (interval.num_milliseconds() as f64 * tolerance).round() as i64;
        Self {
            staleness_threshold: Duration::milliseconds(millis),
        }
    }
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self::from_refresh_interval(DEFAULT_REFRESH_INTERVAL, DEFAULT_STALENESS_TOLERANCE)
    }
}

/// A reconstructed span during which a user is considered online.
///
/// Boundaries are inclusive. A degenerate interval (`start == end`) marks a
/// single instant of presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    /// Creates an interval, swapping the bounds if given in reverse.
    pub fn new(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Inclusive membership test.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Latest instant a sample proves the user online.
fn reach(sample: &Sample, threshold: Duration) -> DateTime<Utc> {
    if sample.observed_at() - sample.last_active() <= threshold {
        sample.observed_at()
    } else {
        sample.last_active()
    }
}

/// Reconstruct the online intervals of one user.
///
/// The result is ascending and non-overlapping; the same history always
/// yields the same intervals.
pub fn reconstruct(history: &UserHistory, config: &ReconstructConfig) -> Vec<Interval> {
    let threshold = config.staleness_threshold;
    let mut intervals = Vec::new();
    let mut samples = history.samples().iter();

    let Some(first) = samples.next() else {
        return intervals;
    };
    let mut current = Interval::new(first.last_active(), reach(first, threshold));
    let mut previous_poll = first.observed_at();

    for sample in samples {
        let active = sample.last_active();
        let polled_in_time = sample.observed_at() - previous_poll <= threshold;
        let continues = active <= current.end
            || (polled_in_time && active - current.end <= threshold);

        if continues {
            current.end = current.end.max(reach(sample, threshold));
        } else {
            intervals.push(current);
            current = Interval::new(active, reach(sample, threshold));
        }
        previous_poll = sample.observed_at();
    }
    intervals.push(current);

    intervals
}
