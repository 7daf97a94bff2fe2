//! Feed decoded events from JSON-lines input into a [`FluxMonitor`].
//!
//! Files are replayed on event time: the sweep runs whenever `processed_at`
//! crosses another probe interval, and once more past the observation window
//! after the last event so nothing is left unfinalized. A live stream (stdin)
//! is fed as it arrives and relies on the background sweeper instead.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use flate2::read::MultiGzDecoder;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::event::DnsEvent;
use crate::monitor::FluxMonitor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub files: usize,
    pub lines: usize,
    pub unparsable: usize,
    pub sweeps: usize,
}

/// `t + d`, pinned to the end of representable time.
fn saturating_add(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Triggers sweeps as event time advances.
struct EventClock {
    period: Duration,
    next_sweep: Option<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
}

impl EventClock {
    fn new(period: Duration) -> Self {
        Self {
            period,
            next_sweep: None,
            latest: None,
        }
    }

    /// Returns true when a sweep is due at `now`.
    fn advance(&mut self, now: DateTime<Utc>) -> bool {
        self.latest = Some(self.latest.map_or(now, |l| l.max(now)));
        match self.next_sweep {
            Some(next) if now < next => false,
            Some(_) => {
                self.next_sweep = Some(saturating_add(now, self.period));
                true
            }
            None => {
                self.next_sweep = Some(saturating_add(now, self.period));
                false
            }
        }
    }
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(MultiGzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(open_input(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.with_context(|| format!("Failed to read {:?}", path))?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Parse lines in parallel, keeping input order.
fn parse_lines(lines: &[String], pool: &rayon::ThreadPool) -> Vec<Option<DnsEvent>> {
    pool.install(|| {
        lines
            .par_iter()
            .map(|line| serde_json::from_str::<DnsEvent>(line).ok())
            .collect()
    })
}

pub fn replay_files(
    monitor: &FluxMonitor,
    paths: &[PathBuf],
    max_workers: Option<usize>,
) -> Result<ReplaySummary> {
    let start_time = Instant::now();
    let max_workers = max_workers.unwrap_or_else(|| std::cmp::min(num_cpus::get(), 8));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_workers)
        .build()
        .context("Failed to build parser thread pool")?;
    info!(action = "configure", component = "replay", worker_count = max_workers, "Using workers for parsing");

    let mut clock = EventClock::new(monitor.config().probe_interval());
    let mut summary = ReplaySummary::default();

    for path in paths {
        let lines = read_lines(path)?;
        info!(action = "load", component = "replay", file_path = ?path, line_count = lines.len(), "Replaying file");

        for parsed in parse_lines(&lines, &pool) {
            summary.lines += 1;
            let Some(event) = parsed else {
                summary.unparsable += 1;
                monitor.reject_unparsable();
                continue;
            };

            monitor.ingest(&event);
            if let Some(now) = DateTime::from_timestamp(event.processed_at, 0) {
                if clock.advance(now) {
                    monitor.sweep_at(now);
                    summary.sweeps += 1;
                }
            }
        }
        summary.files += 1;
    }

    // The input is exhausted: let every remaining window run out.
    if let Some(latest) = clock.latest {
        let end = saturating_add(
            saturating_add(latest, monitor.config().observation_window()),
            Duration::seconds(1),
        );
        monitor.sweep_at(end);
        summary.sweeps += 1;
    }

    if summary.unparsable > 0 {
        warn!(action = "complete", component = "replay", unparsable = summary.unparsable, "Skipped unparsable lines");
    }
    info!(
        action = "complete",
        component = "replay",
        files = summary.files,
        lines = summary.lines,
        sweeps = summary.sweeps,
        duration_ms = start_time.elapsed().as_millis(),
        "Replay completed"
    );
    Ok(summary)
}

/// Feed a live stream line by line until it ends.
pub fn follow_reader<R: BufRead>(monitor: &FluxMonitor, reader: R) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary {
        files: 1,
        ..Default::default()
    };

    for line in reader.lines() {
        let line = line.context("Failed to read event stream")?;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;
        match serde_json::from_str::<DnsEvent>(&line) {
            Ok(event) => {
                monitor.ingest(&event);
            }
            Err(e) => {
                summary.unparsable += 1;
                monitor.reject_unparsable();
                debug!(action = "parse", component = "replay", error = %e, "Unparsable event");
            }
        }
    }
    Ok(summary)
}
