//! Periodic expiry of candidates that stopped receiving events.
//!
//! The update path only finalizes a record when another event arrives for it.
//! The sweeper closes everything whose observation window has run out,
//! whether or not the domain is still active.

use chrono::{DateTime, Utc};
use crossbeam_channel::{select, Receiver, Sender};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::candidate::ResultRecord;
use crate::config::Config;
use crate::error::Error;
use crate::stats::{FinalizedBy, Stats};
use crate::store::CandidateStore;

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub evicted: usize,
    pub emitted: usize,
    pub abandoned: usize,
}

pub struct ExpirationSweeper {
    config: Arc<Config>,
    store: Arc<CandidateStore>,
    results: Sender<ResultRecord>,
    stats: Arc<Stats>,
}

impl ExpirationSweeper {
    pub fn new(
        config: Arc<Config>,
        store: Arc<CandidateStore>,
        results: Sender<ResultRecord>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            config,
            store,
            results,
            stats,
        }
    }

    /// Run one cycle against `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let start_time = Instant::now();
        let window = self.config.observation_window();
        let mut report = SweepReport::default();

        let scanned = self.store.scan_and_evict(
            |r| now - r.first_seen > window,
            |key, evicted| {
                let record = match evicted {
                    Ok(record) => record,
                    Err(Error::MissingKey(_)) => {
                        // finalized by the update path since the key snapshot
                        self.stats.record_abandoned();
                        report.abandoned += 1;
                        debug!(action = "skip", component = "sweeper", domain = %key, "Candidate already gone");
                        return;
                    }
                    Err(e) => {
                        self.stats.record_abandoned();
                        report.abandoned += 1;
                        warn!(action = "skip", component = "sweeper", domain = %key, error = %e, "Abandoned candidate");
                        return;
                    }
                };

                report.evicted += 1;
                let qualified = record.qualifies(&self.config.thresholds);
                self.stats.record_finalized(FinalizedBy::Sweep, qualified);
                if !qualified {
                    return;
                }

                if self.results.send(record.snapshot(now)).is_err() {
                    self.stats.record_undelivered();
                    warn!(action = "emit", component = "sweeper", domain = %key, "Result queue closed, candidate not logged");
                    return;
                }
                self.stats.record_emitted();
                report.emitted += 1;
            },
        );
        report.scanned = scanned;

        info!(
            action = "complete",
            component = "sweeper",
            scanned = report.scanned,
            evicted = report.evicted,
            emitted = report.emitted,
            abandoned = report.abandoned,
            remaining = self.store.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Sweep completed"
        );
        report
    }

    /// Run `cycle`, counting and logging a panic instead of unwinding out of
    /// the sweep loop.
    fn guarded<F>(&self, cycle: F) -> Option<SweepReport>
    where
        F: FnOnce() -> SweepReport,
    {
        match panic::catch_unwind(AssertUnwindSafe(cycle)) {
            Ok(report) => Some(report),
            Err(payload) => {
                self.stats.record_sweep_panic();
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(action = "sweep", component = "sweeper", reason = %reason, "Sweep cycle panicked, retrying next period");
                None
            }
        }
    }

    /// Sweep every probe interval until `shutdown` fires or hangs up.
    pub fn run(&self, shutdown: Receiver<()>) {
        let period = Duration::from_secs(self.config.probe_interval.max(1) as u64);
        info!(action = "start", component = "sweeper", period_secs = period.as_secs(), "Expiration sweeper started");

        loop {
            self.guarded(|| self.sweep_at(Utc::now()));
            select! {
                recv(shutdown) -> _ => break,
                default(period) => {}
            }
        }

        info!(action = "stop", component = "sweeper", "Expiration sweeper stopped");
    }

    pub fn spawn(self: Arc<Self>, shutdown: Receiver<()>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("flux-sweeper".to_string())
            .spawn(move || self.run(shutdown))
    }
}
