//! Named reports over a selection of users and metrics.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detector::OnlineDetector;
use crate::range_stats::RangeStatsCalculator;
use crate::store::PresenceSnapshot;
use crate::types::{UserId, ValidationError};

/// Report registry errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReportError {
    /// A report with this name is already registered.
    #[error("report already exists: {name}")]
    AlreadyExists { name: String },

    /// The report definition was invalid.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// A statistic a report can include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportMetric {
    Total,
    DailyAverage,
    WeeklyAverage,
    Min,
    Max,
}

impl ReportMetric {
    pub const ALL: [Self; 5] = [
        Self::Total,
        Self::DailyAverage,
        Self::WeeklyAverage,
        Self::Min,
        Self::Max,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::DailyAverage => "dailyAverage",
            Self::WeeklyAverage => "weeklyAverage",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for ReportMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReportMetric {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownMetric {
                value: s.to_string(),
            })
    }
}

/// Which users and metrics a named report covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub name: String,
    #[serde(default)]
    pub users: Vec<UserId>,
    #[serde(default)]
    pub metrics: BTreeSet<ReportMetric>,
}

impl ReportDefinition {
    pub fn new(
        name: impl Into<String>,
        users: Vec<UserId>,
        metrics: impl IntoIterator<Item = ReportMetric>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "report name",
            });
        }
        Ok(Self {
            name,
            users,
            metrics: metrics.into_iter().collect(),
        })
    }

    fn wants(&self, metric: ReportMetric) -> bool {
        self.metrics.contains(&metric)
    }

    /// Evaluates the report over `[from, to)`.
    ///
    /// Listed users missing from the snapshot are skipped. Metrics not selected
    /// are left as `None`.
    pub fn evaluate(
        &self,
        snapshot: &PresenceSnapshot,
        detector: &OnlineDetector,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<ReportItem> {
        let ranges = RangeStatsCalculator::new(*detector);
        self.users
            .iter()
            .filter_map(|user_id| {
                let history = snapshot.get(user_id)?;
                let min_max = (self.wants(ReportMetric::Min) || self.wants(ReportMetric::Max))
                    .then(|| ranges.calculate_min_max(history, from, to));
                Some(ReportItem {
                    user_id: *user_id,
                    total: self
                        .wants(ReportMetric::Total)
                        .then(|| detector.total_online_duration(history)),
                    daily_average: self
                        .wants(ReportMetric::DailyAverage)
                        .then(|| detector.daily_average(history)),
                    weekly_average: self
                        .wants(ReportMetric::WeeklyAverage)
                        .then(|| detector.weekly_average(history)),
                    min: min_max
                        .filter(|_| self.wants(ReportMetric::Min))
                        .map(|m| m.min),
                    max: min_max
                        .filter(|_| self.wants(ReportMetric::Max))
                        .map(|m| m.max),
                })
            })
            .collect()
    }
}

/// One user's row in an evaluated report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportItem {
    pub user_id: UserId,
    pub total: Option<Duration>,
    pub daily_average: Option<Duration>,
    pub weekly_average: Option<Duration>,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

/// In-memory collection of named reports.
#[derive(Debug, Clone, Default)]
pub struct ReportRegistry {
    reports: BTreeMap<String, ReportDefinition>,
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a report; names are unique.
    pub fn add(&mut self, definition: ReportDefinition) -> Result<(), ReportError> {
        if definition.name.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "report name",
            }
            .into());
        }
        if self.reports.contains_key(&definition.name) {
            return Err(ReportError::AlreadyExists {
                name: definition.name,
            });
        }
        self.reports.insert(definition.name.clone(), definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ReportDefinition> {
        self.reports.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReportDefinition> {
        self.reports.values()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::ReconstructConfig;
    use crate::sample::Sample;
    use crate::store::{PresenceStore, Roster};
    use chrono::TimeZone;

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn user(n: u128) -> UserId {
        UserId::from_uuid(uuid::Uuid::from_u128(n))
    }

    fn detector() -> OnlineDetector {
        OnlineDetector::new(ReconstructConfig {
            staleness_threshold: Duration::minutes(8),
        })
    }

    fn store_with_polls(user_id: UserId, minutes: &[i64]) -> PresenceStore {
        let store = PresenceStore::new();
        for &minute in minutes {
            let roster: Roster = [(user_id, Sample::active_at(ts(minute)))].into();
            store.merge(&roster);
        }
        store
    }

    #[test]
    fn test_metric_names_round_trip() {
        for metric in ReportMetric::ALL {
            assert_eq!(metric.as_str().parse::<ReportMetric>().unwrap(), metric);
        }
        assert!("median".parse::<ReportMetric>().is_err());
    }

    #[test]
    fn test_metric_deserializes_from_camel_case() {
        let metric: ReportMetric = serde_json::from_str("\"weeklyAverage\"").unwrap();
        assert_eq!(metric, ReportMetric::WeeklyAverage);
    }

    #[test]
    fn test_definition_rejects_empty_name() {
        assert!(ReportDefinition::new(" ", vec![], []).is_err());
    }

    #[test]
    fn test_evaluate_fills_only_selected_metrics() {
        let store = store_with_polls(user(1), &[0, 5, 10, 30, 32]);
        let definition =
            ReportDefinition::new("daily", vec![user(1)], [ReportMetric::Total, ReportMetric::Max])
                .unwrap();

        let items = definition.evaluate(&store.current_snapshot(), &detector(), ts(0), ts(60));
        assert_eq!(
            items,
            vec![ReportItem {
                user_id: user(1),
                total: Some(Duration::minutes(12)),
                daily_average: None,
                weekly_average: None,
                min: None,
                max: Some(Duration::minutes(10)),
            }]
        );
    }

    #[test]
    fn test_evaluate_skips_unknown_users() {
        let store = store_with_polls(user(1), &[0]);
        let definition =
            ReportDefinition::new("all", vec![user(2), user(1)], ReportMetric::ALL).unwrap();

        let items = definition.evaluate(&store.current_snapshot(), &detector(), ts(0), ts(60));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].user_id, user(1));
        assert_eq!(items[0].min, Some(Duration::zero()));
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let mut registry = ReportRegistry::new();
        let definition = ReportDefinition::new("weekly", vec![], [ReportMetric::Total]).unwrap();

        registry.add(definition.clone()).unwrap();
        assert_eq!(
            registry.add(definition),
            Err(ReportError::AlreadyExists {
                name: "weekly".to_string()
            })
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.get("weekly").is_some());
    }
}
