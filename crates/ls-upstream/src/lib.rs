//! Upstream integration for the last-seen tracker.
//!
//! Provides:
//! - [`HttpRosterFetcher`]: paged client for the upstream last-seen API
//! - [`Refresher`]: the background loop merging rosters into the presence store
//! - [`LastSeenStatus`]: coarse human-readable last-seen bands

use std::time::Duration;

use thiserror::Error;

pub mod fetcher;
pub mod refresher;
pub mod status;

pub use fetcher::{HttpRosterFetcher, RosterEntry, RosterFetcher, RosterListing, RosterPage};
pub use refresher::{Refresher, RefresherConfig};
pub use status::LastSeenStatus;

/// Roster fetch errors.
///
/// These never reach query callers; the refresher logs them and retries on
/// the next cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Upstream answered with a non-success status.
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Failed to parse the roster payload.
    #[error("invalid roster payload: {0}")]
    InvalidPayload(String),
    /// The fetch did not finish in time.
    #[error("roster fetch timed out after {after:?}")]
    Timeout { after: Duration },
    /// Upstream kept returning pages past the safety limit.
    #[error("roster exceeded {pages} pages")]
    TooManyPages { pages: usize },
}
