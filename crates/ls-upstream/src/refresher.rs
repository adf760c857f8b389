//! Periodic roster refresh.
//!
//! Each cycle fetches the roster under a timeout and merges it into the store.
//! A failed cycle is logged and skipped; the store keeps its last snapshot and
//! the next cycle starts on schedule.

use std::sync::Arc;
use std::time::Duration;

use ls_core::{MergeStats, PresenceStore};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::FetchError;
use crate::fetcher::RosterFetcher;

/// Timing for the refresh loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefresherConfig {
    /// Period between cycle starts. A cycle that overruns delays the next
    /// one instead of triggering a burst.
    /// Default: 30 seconds.
    pub interval: Duration,
    /// Upper bound on one roster fetch.
    /// Default: 10 seconds.
    pub fetch_timeout: Duration,
    /// Stop after this many cycles. `None` runs until shutdown.
    pub max_cycles: Option<u32>,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
            max_cycles: None,
        }
    }
}

/// Pulls rosters from upstream and merges them into the store.
#[derive(Debug)]
pub struct Refresher<F> {
    store: Arc<PresenceStore>,
    fetcher: F,
    config: RefresherConfig,
}

impl<F: RosterFetcher> Refresher<F> {
    pub const fn new(store: Arc<PresenceStore>, fetcher: F, config: RefresherConfig) -> Self {
        Self {
            store,
            fetcher,
            config,
        }
    }

    pub const fn store(&self) -> &Arc<PresenceStore> {
        &self.store
    }

    /// Runs exactly one fetch-and-merge cycle.
    pub async fn run_cycle(&self) -> Result<MergeStats, FetchError> {
        let roster = tokio::time::timeout(self.config.fetch_timeout, self.fetcher.fetch_all())
            .await
            .map_err(|_| FetchError::Timeout {
                after: self.config.fetch_timeout,
            })??;

        let (_, stats) = self.store.merge_with_stats(&roster);
        Ok(stats)
    }

    /// Starts a cycle every `interval` until `shutdown` flips to `true`, its
    /// sender is dropped, or `max_cycles` cycles have run. Returns the number
    /// of cycles started.
    ///
    /// A fetch still in flight at shutdown is abandoned; nothing is merged for
    /// that cycle.
    pub async fn run_forever(&self, mut shutdown: watch::Receiver<bool>) -> u32 {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle: u32 = 0;
        tracing::info!(interval = ?self.config.interval, max_cycles = ?self.config.max_cycles, "refresher started");

        while !*shutdown.borrow() {
            if self.config.max_cycles.is_some_and(|max| cycle >= max) {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            cycle += 1;
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                result = self.run_cycle() => match result {
                    Ok(stats) => tracing::info!(
                        cycle,
                        users = self.store.current_snapshot().len(),
                        appended = stats.appended,
                        new_users = stats.new_users,
                        "refresh complete"
                    ),
                    Err(err) => tracing::warn!(
                        cycle,
                        error = %err,
                        "refresh failed, keeping last snapshot"
                    ),
                },
            }
        }

        tracing::info!(cycles = cycle, "refresher stopped");
        cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use ls_core::{Roster, Sample, UserId};

    fn user(n: u128) -> UserId {
        UserId::from_uuid(uuid::Uuid::from_u128(n))
    }

    fn poll(n: usize) -> DateTime<Utc> {
        let minutes = i64::try_from(n).unwrap();
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + ChronoDuration::minutes(minutes)
    }

    fn quick() -> RefresherConfig {
        RefresherConfig {
            interval: Duration::from_millis(1),
            fetch_timeout: Duration::from_secs(5),
            max_cycles: None,
        }
    }

    /// Succeeds on odd calls, fails on even ones, and requests shutdown on
    /// call `stop_after`.
    struct ScriptedFetcher {
        calls: AtomicUsize,
        stop_after: usize,
        shutdown: watch::Sender<bool>,
    }

    impl RosterFetcher for ScriptedFetcher {
        fn fetch_all(&self) -> impl Future<Output = Result<Roster, FetchError>> + Send {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.stop_after {
                let _ = self.shutdown.send(true);
            }
            let result = if call % 2 == 0 {
                Err(FetchError::InvalidPayload(format!("call {call}")))
            } else {
                Ok(Roster::from([(user(1), Sample::active_at(poll(call)))]))
            };
            async move { result }
        }
    }

    /// Never answers.
    struct HangingFetcher;

    impl RosterFetcher for HangingFetcher {
        fn fetch_all(&self) -> impl Future<Output = Result<Roster, FetchError>> + Send {
            std::future::pending()
        }
    }

    #[tokio::test]
    async fn test_run_cycle_merges_roster() {
        let (shutdown, _rx) = watch::channel(false);
        let fetcher = ScriptedFetcher {
            calls: AtomicUsize::new(0),
            stop_after: usize::MAX,
            shutdown,
        };
        let refresher = Refresher::new(Arc::new(PresenceStore::new()), fetcher, quick());

        let stats = refresher.run_cycle().await.unwrap();
        assert_eq!(stats.appended, 1);
        assert_eq!(stats.new_users, 1);
        assert!(refresher.store().current_snapshot().contains(&user(1)));
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_last_snapshot() {
        let (shutdown, _rx) = watch::channel(false);
        let fetcher = ScriptedFetcher {
            calls: AtomicUsize::new(0),
            stop_after: usize::MAX,
            shutdown,
        };
        let refresher = Refresher::new(Arc::new(PresenceStore::new()), fetcher, quick());

        refresher.run_cycle().await.unwrap();
        let before = refresher.store().current_snapshot();
        assert!(refresher.run_cycle().await.is_err());
        let after = refresher.store().current_snapshot();

        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out() {
        let config = RefresherConfig {
            interval: Duration::from_millis(1),
            fetch_timeout: Duration::from_millis(10),
            max_cycles: None,
        };
        let refresher = Refresher::new(Arc::new(PresenceStore::new()), HangingFetcher, config);

        let err = refresher.run_cycle().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "{err}");
        assert!(refresher.store().current_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let (shutdown, rx) = watch::channel(false);
        let fetcher = ScriptedFetcher {
            calls: AtomicUsize::new(0),
            stop_after: 5,
            shutdown,
        };
        let refresher = Refresher::new(Arc::new(PresenceStore::new()), fetcher, quick());

        refresher.run_forever(rx).await;

        assert_eq!(refresher.fetcher.calls.load(Ordering::SeqCst), 5);
        // Calls 1, 3 and 5 succeeded; 2 and 4 failed.
        let snapshot = refresher.store().current_snapshot();
        assert_eq!(snapshot.generation(), 3);
        assert_eq!(snapshot.get(&user(1)).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_hanging_fetch() {
        let (shutdown, rx) = watch::channel(false);
        let config = RefresherConfig {
            interval: Duration::from_millis(1),
            fetch_timeout: Duration::from_secs(3600),
            max_cycles: None,
        };
        let refresher = Refresher::new(Arc::new(PresenceStore::new()), HangingFetcher, config);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            shutdown.send(true).unwrap();
        });
        refresher.run_forever(rx).await;
        stopper.await.unwrap();

        assert_eq!(refresher.store().current_snapshot().generation(), 0);
    }

    #[tokio::test]
    async fn test_already_stopped_loop_never_fetches() {
        let (shutdown, rx) = watch::channel(true);
        let fetcher = ScriptedFetcher {
            calls: AtomicUsize::new(0),
            stop_after: usize::MAX,
            shutdown,
        };
        let refresher = Refresher::new(Arc::new(PresenceStore::new()), fetcher, quick());

        refresher.run_forever(rx).await;
        assert_eq!(refresher.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    /// Takes `delay` of (tokio) time per fetch and counts calls.
    struct SlowFetcher {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl RosterFetcher for SlowFetcher {
        fn fetch_all(&self) -> impl Future<Output = Result<Roster, FetchError>> + Send {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = self.delay;
            async move {
                tokio::time::sleep(delay).await;
                Ok(Roster::from([(user(1), Sample::active_at(poll(call)))]))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_start_on_a_fixed_period() {
        let config = RefresherConfig {
            interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(25),
            max_cycles: None,
        };
        let fetcher = SlowFetcher {
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(20),
        };
        let refresher = Refresher::new(Arc::new(PresenceStore::new()), fetcher, config);

        let (shutdown, rx) = watch::channel(false);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(295)).await;
            shutdown.send(true).unwrap();
        });
        let cycles = refresher.run_forever(rx).await;
        stopper.await.unwrap();

        // Starts at 0, 30, ..., 270; a 20 s fetch does not push the schedule.
        assert_eq!(cycles, 10);
        assert_eq!(refresher.fetcher.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_fetch_delays_next_cycle() {
        let config = RefresherConfig {
            interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(60),
            max_cycles: None,
        };
        let fetcher = SlowFetcher {
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(25),
        };
        let refresher = Refresher::new(Arc::new(PresenceStore::new()), fetcher, config);

        let (shutdown, rx) = watch::channel(false);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            shutdown.send(true).unwrap();
        });
        refresher.run_forever(rx).await;
        stopper.await.unwrap();

        // Starts at 0, 25 and 50; the third fetch is abandoned at shutdown.
        assert_eq!(refresher.fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_cycles_stops_the_loop() {
        let config = RefresherConfig {
            max_cycles: Some(3),
            ..quick()
        };
        let (shutdown, rx) = watch::channel(false);
        let fetcher = ScriptedFetcher {
            calls: AtomicUsize::new(0),
            stop_after: usize::MAX,
            shutdown,
        };
        let refresher = Refresher::new(Arc::new(PresenceStore::new()), fetcher, config);

        let cycles = refresher.run_forever(rx).await;

        assert_eq!(cycles, 3);
        assert_eq!(refresher.fetcher.calls.load(Ordering::SeqCst), 3);
        // Calls 1 and 3 succeeded.
        assert_eq!(refresher.store().current_snapshot().generation(), 2);
    }
}
