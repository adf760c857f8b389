//! Fetch command: one roster fetch, printed as an online count or as each
//! user's last-seen status.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ls_core::{Clock, OnlineDetector, PresenceService, PresenceStore, SystemClock, UserId};
use ls_upstream::{FetchError, HttpRosterFetcher, RosterListing};
use serde::Serialize;

use crate::config::Config;

/// Online count for a single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSummary {
    pub observed_at: DateTime<Utc>,
    pub users: usize,
    pub online: usize,
}

/// One user's last-seen status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedUser {
    pub user_id: UserId,
    pub name: String,
    pub status: String,
    pub description: String,
}

/// Runs `lastseen fetch`.
pub async fn run(config: &Config, formatted: bool, json: bool) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = HttpRosterFetcher::new(
        config.upstream_url.clone(),
        config.fetch_timeout(),
        Arc::clone(&clock),
    )
    .context("failed to create upstream client")?;

    let timeout = config.fetch_timeout();
    let listing = tokio::time::timeout(timeout, fetcher.fetch_listing())
        .await
        .map_err(|_| FetchError::Timeout { after: timeout })
        .and_then(|result| result)
        .with_context(|| format!("failed to fetch roster from {}", config.upstream_url))?;

    if formatted {
        let users = formatted_users(&listing);
        if json {
            println!("{}", serde_json::to_string_pretty(&users)?);
        } else {
            for user in &users {
                println!("{}", user.description);
            }
        }
        return Ok(());
    }

    let summary = summarize(config, &listing, clock);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_summary(&summary));
    }
    Ok(())
}

/// Counts who is online at the instant the listing was fetched.
fn summarize(config: &Config, listing: &RosterListing, clock: Arc<dyn Clock>) -> FetchSummary {
    let service = PresenceService::new(
        Arc::new(PresenceStore::new()),
        OnlineDetector::new(config.reconstruct_config()),
        clock,
    );
    service.store().merge(&listing.roster());

    FetchSummary {
        observed_at: listing.observed_at,
        users: service.store().current_snapshot().len(),
        online: service.users_online(listing.observed_at),
    }
}

fn formatted_users(listing: &RosterListing) -> Vec<FormattedUser> {
    listing
        .statuses()
        .map(|(entry, status)| {
            let name = entry.display_name();
            FormattedUser {
                user_id: entry.user_id,
                status: status.to_string(),
                description: status.describe(&name),
                name,
            }
        })
        .collect()
}

fn format_summary(summary: &FetchSummary) -> String {
    format!(
        "{} of {} users online at {}",
        summary.online,
        summary.users,
        summary.observed_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}
