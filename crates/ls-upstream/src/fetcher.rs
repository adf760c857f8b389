//! Upstream roster client.
//!
//! The upstream API pages its user list by offset:
//!
//! ```text
//! GET {base_url}?offset=0
//! { "total": 217, "data": [ { "userId": "...", "nickname": "...",
//!   "lastSeenDate": "2024-01-01T09:00:00+00:00" | null, "isOnline": false } ] }
//! ```
//!
//! Each page is converted into samples stamped with the instant the fetch
//! started.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use ls_core::{Clock, Roster, Sample, UserId};
use serde::Deserialize;

use crate::FetchError;
use crate::status::LastSeenStatus;

/// Stop paging after this many pages even if upstream keeps answering.
const MAX_PAGES: usize = 10_000;

/// Source of the current roster of last-seen values.
pub trait RosterFetcher: Send + Sync {
    /// Fetches one sample per known upstream user.
    fn fetch_all(&self) -> impl Future<Output = Result<Roster, FetchError>> + Send;
}

/// One page of the upstream user list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterPage {
    /// Total number of users across all pages.
    pub total: usize,
    #[serde(default)]
    pub data: Vec<RosterEntry>,
}

/// One user as reported by upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub user_id: UserId,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub last_seen_date: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub is_online: bool,
}

impl RosterEntry {
    /// Converts the entry into a sample polled at `observed_at`.
    ///
    /// Returns `None` for users that are offline and were never seen.
    pub fn sample(&self, observed_at: DateTime<Utc>) -> Option<Sample> {
        if self.is_online {
            return Some(Sample::active_at(observed_at));
        }
        let last_seen = self.last_seen_date?.with_timezone(&Utc);
        Some(Sample::clamped(observed_at, last_seen))
    }

    /// Last-seen status relative to `now`.
    pub fn status(&self, now: DateTime<Utc>) -> LastSeenStatus {
        LastSeenStatus::classify(
            self.is_online,
            self.last_seen_date.map(|seen| seen.with_timezone(&Utc)),
            now,
        )
    }

    /// Nickname, or the user ID when upstream sent none.
    pub fn display_name(&self) -> String {
        self.nickname
            .clone()
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

/// Every entry from one complete paged fetch.
#[derive(Debug, Clone)]
pub struct RosterListing {
    /// When the fetch started; every sample is stamped with it.
    pub observed_at: DateTime<Utc>,
    pub entries: Vec<RosterEntry>,
}

impl RosterListing {
    /// Samples for every usable entry.
    pub fn roster(&self) -> Roster {
        self.entries
            .iter()
            .filter_map(|entry| {
                entry
                    .sample(self.observed_at)
                    .map(|sample| (entry.user_id, sample))
            })
            .collect()
    }

    /// Human-readable last-seen status of each entry, in upstream order.
    pub fn statuses(&self) -> impl Iterator<Item = (&RosterEntry, LastSeenStatus)> + '_ {
        self.entries
            .iter()
            .map(|entry| (entry, entry.status(self.observed_at)))
    }
}

/// Fetches the roster over HTTP.
pub struct HttpRosterFetcher {
    http: reqwest::Client,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for HttpRosterFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRosterFetcher")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpRosterFetcher {
    /// Creates a fetcher whose requests time out after `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            clock,
        })
    }

    async fn fetch_page(&self, offset: usize) -> Result<RosterPage, FetchError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("offset", offset)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|err| FetchError::InvalidPayload(err.to_string()))
    }

    /// Fetches every page, stamping the listing with the fetch start.
    pub async fn fetch_listing(&self) -> Result<RosterListing, FetchError> {
        let observed_at = self.clock.now();
        let mut entries = Vec::new();

        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(entries.len()).await?;
            if page.data.is_empty() {
                return Ok(RosterListing {
                    observed_at,
                    entries,
                });
            }
            entries.extend(page.data);
            tracing::trace!(offset = entries.len(), total = page.total, "fetched roster page");
            if entries.len() >= page.total {
                return Ok(RosterListing {
                    observed_at,
                    entries,
                });
            }
        }

        Err(FetchError::TooManyPages { pages: MAX_PAGES })
    }

    async fn fetch_roster(&self) -> Result<Roster, FetchError> {
        self.fetch_listing().await.map(|listing| listing.roster())
    }
}

impl RosterFetcher for HttpRosterFetcher {
    fn fetch_all(&self) -> impl Future<Output = Result<Roster, FetchError>> + Send {
        self.fetch_roster()
    }
}
