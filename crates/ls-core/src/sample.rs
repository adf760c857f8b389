//! Poll samples and per-user sample history.

use chrono::{DateTime, Utc};

use crate::types::ValidationError;

/// One poll result for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// When the poll happened.
    observed_at: DateTime<Utc>,
    /// Upstream-reported last activity as of that poll.
    last_active: DateTime<Utc>,
}

impl Sample {
    /// Creates a sample, rejecting activity reported after the poll.
    pub fn new(
        observed_at: DateTime<Utc>,
        last_active: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if last_active > observed_at {
            return Err(ValidationError::ActiveAfterObserved {
                observed_at,
                last_active,
            });
        }
        Ok(Self {
            observed_at,
            last_active,
        })
    }

    /// Creates a sample, pulling `last_active` back to `observed_at` when
    /// upstream reports a later instant (clock skew between us and upstream).
    #[must_use]
    pub fn clamped(observed_at: DateTime<Utc>, last_active: DateTime<Utc>) -> Self {
        Self {
            observed_at,
            last_active: last_active.min(observed_at),
        }
    }

    /// A sample of a user seen active at the moment of the poll.
    #[must_use]
    pub const fn active_at(observed_at: DateTime<Utc>) -> Self {
        Self {
            observed_at,
            last_active: observed_at,
        }
    }

    pub const fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub const fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }
}

/// Outcome of appending a sample to a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    /// The sample was stored.
    Stored,
    /// A sample for the same poll instant already exists; the new one was dropped.
    Duplicate,
}

/// Ordered, deduplicated samples for one user.
///
/// Samples are strictly increasing by `observed_at`. The first sample stored
/// for a given poll instant wins; later ones for the same instant are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserHistory {
    samples: Vec<Sample>,
}

impl UserHistory {
    pub const fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    /// Builds a history from samples in any order, applying the dedup rule in
    /// iteration order.
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut history = Self::new();
        for sample in samples {
            history.append(sample);
        }
        history
    }

    /// Appends a sample, keeping the order invariant.
    ///
    /// Samples normally arrive in poll order and are pushed at the end; an
    /// out-of-order sample is inserted at its sorted position.
    pub fn append(&mut self, sample: Sample) -> Appended {
        match self.samples.last() {
            None => {
                self.samples.push(sample);
                Appended::Stored
            }
            Some(last) if last.observed_at < sample.observed_at => {
                self.samples.push(sample);
                Appended::Stored
            }
            Some(_) => match self
                .samples
                .binary_search_by_key(&sample.observed_at, Sample::observed_at)
            {
                Ok(_) => Appended::Duplicate,
                Err(pos) => {
                    self.samples.insert(pos, sample);
                    Appended::Stored
                }
            },
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Time between the first and last poll, or `None` for an empty history.
    pub fn span(&self) -> Option<chrono::Duration> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        Some(last.observed_at - first.observed_at)
    }
}
