//! Human-readable last-seen status.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// How long ago a user was last seen, in coarse bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LastSeenStatus {
    Online,
    /// Under 30 seconds.
    JustNow,
    /// Under a minute.
    LessThanAMinuteAgo,
    /// Under an hour.
    CoupleOfMinutesAgo,
    /// Under two hours.
    HourAgo,
    /// Under a day.
    Today,
    /// Under two days.
    Yesterday,
    /// Under a week.
    ThisWeek,
    LongTimeAgo,
    /// Offline with no recorded activity.
    Never,
}

impl LastSeenStatus {
    /// Classifies a user's last activity as of `now`.
    ///
    /// A last-seen time after `now` counts as "just now".
    pub fn classify(is_online: bool, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        if is_online {
            return Self::Online;
        }
        let Some(last_seen) = last_seen else {
            return Self::Never;
        };

        let elapsed = (now - last_seen).max(Duration::zero());
        if elapsed < Duration::seconds(30) {
            Self::JustNow
        } else if elapsed < Duration::minutes(1) {
            Self::LessThanAMinuteAgo
        } else if elapsed < Duration::hours(1) {
            Self::CoupleOfMinutesAgo
        } else if elapsed < Duration::hours(2) {
            Self::HourAgo
        } else if elapsed < Duration::days(1) {
            Self::Today
        } else if elapsed < Duration::days(2) {
            Self::Yesterday
        } else if elapsed < Duration::weeks(1) {
            Self::ThisWeek
        } else {
            Self::LongTimeAgo
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::JustNow => "just now",
            Self::LessThanAMinuteAgo => "less than a minute ago",
            Self::CoupleOfMinutesAgo => "couple of minutes ago",
            Self::HourAgo => "hour ago",
            Self::Today => "today",
            Self::Yesterday => "yesterday",
            Self::ThisWeek => "this week",
            Self::LongTimeAgo => "long time ago",
            Self::Never => "never",
        }
    }

    /// Sentence describing a user with this status.
    pub fn describe(&self, name: &str) -> String {
        match self {
            Self::Online => format!("{name} is online"),
            Self::Never => format!("{name} was never seen online"),
            other => format!("{name} was online {other}"),
        }
    }
}

impl fmt::Display for LastSeenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
