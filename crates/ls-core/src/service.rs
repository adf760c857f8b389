//! Query facade over the presence store.
//!
//! Every call resolves against the snapshot current at the time of the call,
//! so a single query never mixes data from two refreshes.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::clock::Clock;
use crate::detector::OnlineDetector;
use crate::predictor::Predictor;
use crate::range_stats::{MinMax, RangeStatsCalculator};
use crate::report::{ReportDefinition, ReportItem};
use crate::sample::UserHistory;
use crate::store::{PresenceSnapshot, PresenceStore};
use crate::types::{Probability, UserId};

/// Query errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// No history exists for this user.
    #[error("user not found: {user_id}")]
    NotFound { user_id: UserId },
}

/// Presence of one user at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPresence {
    pub was_online: bool,
    pub nearest_online_time: Option<DateTime<Utc>>,
}

/// Forecast for one user, compared against a caller-supplied tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserPrediction {
    pub online_chance: Probability,
    pub will_be_online: bool,
}

/// Average online time per active day and per active week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAverages {
    pub daily: Duration,
    pub weekly: Duration,
}

/// The operations exposed to request handlers and report aggregation.
pub struct PresenceService {
    store: Arc<PresenceStore>,
    detector: OnlineDetector,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PresenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceService")
            .field("detector", &self.detector)
            .finish_non_exhaustive()
    }
}

impl PresenceService {
    pub fn new(store: Arc<PresenceStore>, detector: OnlineDetector, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            detector,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<PresenceStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Number of users online at `at`.
    pub fn users_online(&self, at: DateTime<Utc>) -> usize {
        let snapshot = self.store.current_snapshot();
        self.detector.count_online(&snapshot.histories(), at)
    }

    /// Whether the user was online at `at`, and the nearest online boundary.
    pub fn user_presence(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<UserPresence, QueryError> {
        self.with_user(user_id, |history| UserPresence {
            was_online: self.detector.detect(history, at),
            nearest_online_time: self.detector.closest_online_time(history, at),
        })
    }

    /// Users predicted online at `at`.
    pub fn predicted_online_users(&self, at: DateTime<Utc>) -> BTreeSet<UserId> {
        let snapshot = self.store.current_snapshot();
        self.predictor().predict_users_online(&snapshot.histories(), at)
    }

    /// Online chance for one user; `will_be_online` when it exceeds `tolerance`.
    pub fn user_prediction(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
        tolerance: f64,
    ) -> Result<UserPrediction, QueryError> {
        self.with_user(user_id, |history| {
            let online_chance = self.predictor().predict_user_online(history, at);
            UserPrediction {
                online_chance,
                will_be_online: online_chance.exceeds(tolerance),
            }
        })
    }

    /// Total online time for one user.
    pub fn user_total(&self, user_id: &UserId) -> Result<Duration, QueryError> {
        self.with_user(user_id, |history| self.detector.total_online_duration(history))
    }

    /// Daily and weekly average online time for one user.
    pub fn user_averages(&self, user_id: &UserId) -> Result<UserAverages, QueryError> {
        self.with_user(user_id, |history| UserAverages {
            daily: self.detector.daily_average(history),
            weekly: self.detector.weekly_average(history),
        })
    }

    /// Shortest and longest online stretch for one user within `[from, to)`.
    pub fn user_min_max(
        &self,
        user_id: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<MinMax, QueryError> {
        let ranges = RangeStatsCalculator::new(self.detector);
        self.with_user(user_id, |history| ranges.calculate_min_max(history, from, to))
    }

    /// Permanently erases a user; returns whether they existed.
    pub fn forget(&self, user_id: &UserId) -> bool {
        self.store.forget(user_id)
    }

    /// Evaluates a report definition over `[from, to)`.
    pub fn report(
        &self,
        definition: &ReportDefinition,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<ReportItem> {
        definition.evaluate(&self.store.current_snapshot(), &self.detector, from, to)
    }

    const fn predictor(&self) -> Predictor {
        Predictor::new(self.detector)
    }

    fn with_user<T>(&self, user_id: &UserId, query: impl FnOnce(&UserHistory) -> T) -> Result<T, QueryError> {
        let snapshot: Arc<PresenceSnapshot> = self.store.current_snapshot();
        snapshot
            .get(user_id)
            .map(query)
            .ok_or(QueryError::NotFound { user_id: *user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::interval::ReconstructConfig;
    use crate::sample::Sample;
    use crate::store::Roster;
    use chrono::TimeZone;

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn user(n: u128) -> UserId {
        UserId::from_uuid(uuid::Uuid::from_u128(n))
    }

    fn service() -> PresenceService {
        let store = Arc::new(PresenceStore::new());
        for minute in [0, 5, 10] {
            let roster: Roster = [
                (user(1), Sample::active_at(ts(minute))),
                (user(2), Sample::new(ts(minute), ts(-120)).unwrap()),
            ]
            .into();
            store.merge(&roster);
        }
        let detector = OnlineDetector::new(ReconstructConfig {
            staleness_threshold: Duration::minutes(8),
        });
        PresenceService::new(store, detector, Arc::new(FixedClock(ts(10))))
    }

    #[test]
    fn test_unknown_user_is_not_found() {
        let service = service();
        let missing = user(99);
        let expected = QueryError::NotFound { user_id: missing };

        assert_eq!(service.user_presence(&missing, ts(0)).unwrap_err(), expected);
        assert_eq!(service.user_total(&missing).unwrap_err(), expected);
        assert_eq!(service.user_averages(&missing).unwrap_err(), expected);
        assert_eq!(
            service.user_min_max(&missing, ts(0), ts(10)).unwrap_err(),
            expected
        );
        assert_eq!(
            service.user_prediction(&missing, ts(0), 0.5).unwrap_err(),
            expected
        );
    }

    #[test]
    fn test_presence_and_totals() {
        let service = service();

        assert_eq!(service.users_online(ts(7)), 1);
        assert_eq!(
            service.user_presence(&user(1), ts(7)),
            Ok(UserPresence {
                was_online: true,
                nearest_online_time: Some(ts(10)),
            })
        );
        assert_eq!(service.user_total(&user(1)), Ok(Duration::minutes(10)));
        assert_eq!(service.user_total(&user(2)), Ok(Duration::zero()));
        assert_eq!(
            service.user_averages(&user(1)),
            Ok(UserAverages {
                daily: Duration::minutes(10),
                weekly: Duration::minutes(10),
            })
        );
    }

    #[test]
    fn test_prediction_compares_against_tolerance() {
        let service = service();
        let at = service.now() + Duration::days(7);

        let prediction = service.user_prediction(&user(1), at, 0.9).unwrap();
        assert_eq!(prediction.online_chance, Probability::ONE);
        assert!(prediction.will_be_online);

        let prediction = service.user_prediction(&user(2), at, 0.0).unwrap();
        assert_eq!(prediction.online_chance, Probability::ZERO);
        assert!(!prediction.will_be_online);

        assert_eq!(service.predicted_online_users(at), BTreeSet::from([user(1)]));
    }

    #[test]
    fn test_forget_removes_user_from_queries() {
        let service = service();

        assert!(service.forget(&user(1)));
        assert!(!service.forget(&user(1)));
        assert!(service.user_total(&user(1)).is_err());
        assert_eq!(service.users_online(ts(7)), 0);
    }
}
