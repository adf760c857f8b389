//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The user identifier was not a UUID.
    #[error("invalid user ID: {value}")]
    InvalidUserId { value: String },

    /// A sample reported activity after the poll that observed it.
    #[error("last active {last_active} is after observation time {observed_at}")]
    ActiveAfterObserved {
        observed_at: DateTime<Utc>,
        last_active: DateTime<Utc>,
    },

    /// Unknown report metric name.
    #[error("unknown report metric: {value}")]
    UnknownMetric { value: String },
}

/// A validated upstream user identifier.
///
/// Upstream identifies users by UUID. The hyphenated lowercase form is used
/// for display and serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Wraps an already-parsed UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "user ID" });
        }
        Uuid::parse_str(trimmed)
            .map(Self)
            .map_err(|_| ValidationError::InvalidUserId {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A probability in the range \[0.0, 1.0\].
///
/// Produced by the predictor as the historical share of online observations.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Probability(f64);

impl Probability {
    /// Certain presence (1.0).
    pub const ONE: Self = Self(1.0);

    /// No observed presence (0.0).
    pub const ZERO: Self = Self(0.0);

    /// Creates a probability, clamping to \[0.0, 1.0\].
    ///
    /// NaN values become 0.0.
    #[must_use]
    pub const fn clamped(value: f64) -> Self {
        if value.is_nan() || value < 0.0 {
            Self(0.0)
        } else if value > 1.0 {
            Self(1.0)
        } else {
            Self(value)
        }
    }

    /// Returns the inner value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Whether this probability is strictly above `threshold`.
    #[must_use]
    pub fn exceeds(self, threshold: f64) -> bool {
        self.0 > threshold
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Probability> for f64 {
    fn from(p: Probability) -> Self {
        p.0
    }
}

impl Serialize for Probability {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}
