//! Engine context: owns the store, the result queue and both background
//! threads, and tears them down in order.

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::DnsEvent;
use crate::ingest::{Discard, IngestAdapter, IngestOutcome, StampClock};
use crate::logger::CandidateLogger;
use crate::stats::{Stats, StatsSnapshot};
use crate::store::CandidateStore;
use crate::sweeper::{ExpirationSweeper, SweepReport};

/// Who drives the expiration sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// A background thread sweeps against the wall clock every probe interval.
    Background,
    /// The caller invokes [`FluxMonitor::sweep_at`], e.g. on event time during a replay.
    Manual,
}

pub struct FluxMonitor {
    config: Arc<Config>,
    store: Arc<CandidateStore>,
    stats: Arc<Stats>,
    ingest: IngestAdapter,
    sweeper: Arc<ExpirationSweeper>,
    sweeper_stop: Option<Sender<()>>,
    sweeper_handle: Option<JoinHandle<()>>,
    logger_handle: Option<JoinHandle<Result<()>>>,
}

impl FluxMonitor {
    /// Validate `config`, open the candidate log and start the background threads.
    pub fn start(config: Config, mode: SweepMode) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let config = Arc::new(config);
        let store = Arc::new(CandidateStore::new());
        let stats = Arc::new(Stats::new());
        let (results_tx, results_rx) = bounded(config.queue_capacity);

        let logger = CandidateLogger::open(config.log.clone(), Arc::clone(&stats), Utc::now())?;
        let logger_handle = logger.spawn(results_rx)?;

        // update-path snapshots follow whichever clock drives the sweep
        let stamp = match mode {
            SweepMode::Background => StampClock::Wall,
            SweepMode::Manual => StampClock::Event,
        };
        let ingest = IngestAdapter::new(
            Arc::clone(&config),
            Arc::clone(&store),
            results_tx.clone(),
            Arc::clone(&stats),
            stamp,
        );
        let sweeper = Arc::new(ExpirationSweeper::new(
            Arc::clone(&config),
            Arc::clone(&store),
            results_tx,
            Arc::clone(&stats),
        ));

        let (sweeper_stop, sweeper_handle) = match mode {
            SweepMode::Background => {
                let (stop_tx, stop_rx) = bounded::<()>(0);
                let handle = Arc::clone(&sweeper).spawn(stop_rx)?;
                (Some(stop_tx), Some(handle))
            }
            SweepMode::Manual => (None, None),
        };

        info!(
            action = "start",
            component = "flux_monitor",
            mode = ?mode,
            observation_window_secs = config.observation_window,
            probe_interval_secs = config.probe_interval,
            queue_capacity = config.queue_capacity,
            "Flux monitor started"
        );

        Ok(Self {
            config,
            store,
            stats,
            ingest,
            sweeper,
            sweeper_stop,
            sweeper_handle,
            logger_handle: Some(logger_handle),
        })
    }

    /// Feed one decoded event. Callable from any thread.
    pub fn ingest(&self, event: &DnsEvent) -> IngestOutcome {
        self.ingest.ingest(event)
    }

    /// Count raw feed input that never became an event.
    pub fn reject_unparsable(&self) {
        self.stats.record_event();
        self.stats.record_discard(Discard::Unparsable);
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        self.sweeper.sweep_at(now)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &CandidateStore {
        &self.store
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the sweeper, run a last sweep (background mode only), close the
    /// queue and wait for the logger to write everything it holds.
    pub fn shutdown(mut self) -> Result<StatsSnapshot> {
        if let Some(handle) = self.sweeper_handle.take() {
            drop(self.sweeper_stop.take());
            if handle.join().is_err() {
                warn!(action = "stop", component = "flux_monitor", "Sweeper thread panicked");
            }
            self.sweeper.sweep_at(Utc::now());
        }

        let pending = self.store.len();
        if pending > 0 {
            info!(action = "stop", component = "flux_monitor", pending, "Candidates still inside their window are not logged");
        }

        let Self {
            ingest,
            sweeper,
            logger_handle,
            stats,
            ..
        } = self;
        // Dropping the last senders lets the logger drain and exit.
        drop(ingest);
        drop(sweeper);

        if let Some(handle) = logger_handle {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => warn!(action = "stop", component = "flux_monitor", "Logger thread panicked"),
            }
        }

        let snapshot = stats.snapshot();
        info!(
            action = "stop",
            component = "flux_monitor",
            events = snapshot.events,
            emitted = snapshot.emitted,
            sweep_panics = snapshot.sweep_panics,
            lines_written = snapshot.lines_written,
            "Flux monitor stopped"
        );
        Ok(snapshot)
    }
}
