//! Historical-frequency presence forecasts.
//!
//! A user's chance of being online at some instant is the share of past polls
//! in the same weekday and hour that found them online. With no polls in that
//! slot, the overall online fraction of the user's history is used instead.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use rayon::prelude::*;

use crate::detector::{OnlineDetector, contains};
use crate::sample::UserHistory;
use crate::types::{Probability, UserId};

/// Probability above which a user is predicted online.
pub const DEFAULT_PREDICTION_THRESHOLD: f64 = 0.5;

/// Weekly time slot used to group observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Bucket {
    weekday: Weekday,
    hour: u32,
}

impl Bucket {
    fn of(at: DateTime<Utc>) -> Self {
        Self {
            weekday: at.weekday(),
            hour: at.hour(),
        }
    }
}

/// Forecasts presence from past observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Predictor {
    detector: OnlineDetector,
}

impl Predictor {
    pub const fn new(detector: OnlineDetector) -> Self {
        Self { detector }
    }

    /// Probability that the user is online at `at`.
    #[allow(clippy::cast_precision_loss)]
    pub fn predict_user_online(&self, history: &UserHistory, at: DateTime<Utc>) -> Probability {
        if history.is_empty() {
            return Probability::ZERO;
        }

        let intervals = self.detector.intervals(history);
        let bucket = Bucket::of(at);
        let (online, total) = history
            .samples()
            .iter()
            .map(|sample| sample.observed_at())
            .filter(|observed| Bucket::of(*observed) == bucket)
            .fold((0_usize, 0_usize), |(online, total), observed| {
                (online + usize::from(contains(&intervals, observed)), total + 1)
            });

        if total > 0 {
            return Probability::clamped(online as f64 / total as f64);
        }

        // No polls in this slot: fall back to the overall online fraction.
        let span = history.span().unwrap_or_default().num_milliseconds();
        if span <= 0 {
            return Probability::ZERO;
        }
        let online_ms = self.detector.total_online_duration(history).num_milliseconds();
        Probability::clamped(online_ms as f64 / span as f64)
    }

    /// Users whose probability exceeds [`DEFAULT_PREDICTION_THRESHOLD`].
    pub fn predict_users_online(
        &self,
        histories: &HashMap<UserId, &UserHistory>,
        at: DateTime<Utc>,
    ) -> BTreeSet<UserId> {
        histories
            .par_iter()
            .filter(|(_, history)| {
                self.predict_user_online(history, at)
                    .exceeds(DEFAULT_PREDICTION_THRESHOLD)
            })
            .map(|(user_id, _)| *user_id)
            .collect()
    }
}
