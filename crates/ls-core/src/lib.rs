//! Presence history and analytics engine for the last-seen tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Store: per-user poll history published as immutable snapshots
//! - Interval reconstruction: turning sparse "last seen" samples into online spans
//! - Detection: point-in-time presence and total/average online time
//! - Prediction: historical-frequency forecasts of future presence
//! - Reports: named selections of users and metrics

pub mod clock;
pub mod detector;
pub mod interval;
pub mod predictor;
pub mod range_stats;
pub mod report;
pub mod sample;
pub mod service;
pub mod store;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use detector::OnlineDetector;
pub use interval::{Interval, ReconstructConfig, reconstruct};
pub use predictor::{DEFAULT_PREDICTION_THRESHOLD, Predictor};
pub use range_stats::{MinMax, RangeStatsCalculator};
pub use report::{ReportDefinition, ReportError, ReportItem, ReportMetric, ReportRegistry};
pub use sample::{Sample, UserHistory};
pub use service::{PresenceService, QueryError, UserAverages, UserPrediction, UserPresence};
pub use store::{MergeStats, PresenceSnapshot, PresenceStore, Roster};
pub use types::{Probability, UserId, ValidationError};
