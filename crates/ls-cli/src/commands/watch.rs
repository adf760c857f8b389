//! Watch command: poll upstream, then print reports and queries.

use std::sync::Arc;

use anyhow::{Context, Result};
use ls_core::{Clock, OnlineDetector, PresenceService, PresenceStore, SystemClock};
use ls_upstream::{HttpRosterFetcher, Refresher, RefresherConfig, RosterFetcher};
use serde::Serialize;
use tokio::sync::watch;

use crate::WatchArgs;
use crate::commands::query::{self, QueryOutput, QueryWindow};
use crate::commands::report::{self, ReportOutput};
use crate::commands::util::parse_datetime;
use crate::config::Config;

/// Everything `watch` prints, for `--json`.
#[derive(Debug, Serialize)]
struct WatchOutput<'a> {
    reports: &'a [ReportOutput],
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a QueryOutput>,
}

/// Runs `lastseen watch`.
pub async fn run(config: &Config, args: &WatchArgs) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = config
        .report_registry()
        .context("invalid report configuration")?;

    // Reject bad times before spending time polling.
    let started = clock.now();
    parse_datetime(&args.from, started).context("invalid --from")?;
    parse_datetime(&args.to, started).context("invalid --to")?;
    if let Some(at) = &args.at {
        parse_datetime(at, started).context("invalid --at")?;
    }

    let service = PresenceService::new(
        Arc::new(PresenceStore::new()),
        OnlineDetector::new(config.reconstruct_config()),
        Arc::clone(&clock),
    );
    for user_id in &args.forget {
        let existed = service.forget(user_id);
        tracing::debug!(%user_id, existed, "user forgotten before polling");
    }

    let fetcher = HttpRosterFetcher::new(
        config.upstream_url.clone(),
        config.fetch_timeout(),
        Arc::clone(&clock),
    )
    .context("failed to create upstream client")?;
    let refresher_config = RefresherConfig {
        max_cycles: args.cycles,
        ..config.refresher_config()
    };
    let refresher = Refresher::new(Arc::clone(service.store()), fetcher, refresher_config);
    let cycles = run_until_interrupted(&refresher).await?;

    let now = service.now();
    let from = parse_datetime(&args.from, now).context("invalid --from")?;
    let to = parse_datetime(&args.to, now).context("invalid --to")?;

    tracing::info!(
        cycles,
        users = service.store().current_snapshot().len(),
        online = service.users_online(now),
        "polling finished"
    );

    let reports = report::evaluate_all(&service, &registry, from, to);
    let query = if args.wants_query() {
        let at = match &args.at {
            Some(at) => parse_datetime(at, now).context("invalid --at")?,
            None => now,
        };
        let window = QueryWindow {
            at,
            from,
            to,
            tolerance: args.tolerance,
        };
        Some(query::evaluate(&service, &args.users, window))
    } else {
        None
    };

    if args.json {
        let output = WatchOutput {
            reports: &reports,
            query: query.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", report::format_reports(&reports));
        if let Some(query) = &query {
            println!();
            print!("{}", query::format_query(query));
        }
    }
    Ok(())
}

/// Drives the refresher until it reaches its cycle cap or Ctrl-C arrives.
/// Returns the number of cycles started.
async fn run_until_interrupted<F: RosterFetcher>(refresher: &Refresher<F>) -> Result<u32> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh = refresher.run_forever(shutdown_rx);
    tokio::pin!(refresh);

    tokio::select! {
        cycles = &mut refresh => return Ok(cycles),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("interrupted, stopping refresher");
        }
    }

    let _ = shutdown_tx.send(true);
    Ok(refresh.await)
}
