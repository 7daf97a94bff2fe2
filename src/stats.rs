use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ingest::Discard;

/// Running counters shared by the ingest path, the sweeper and the logger.
#[derive(Debug, Default)]
pub struct Stats {
    events: AtomicU64,
    discarded: [AtomicU64; Discard::ALL.len()],
    created: AtomicU64,
    merged: AtomicU64,
    finalized_on_update: AtomicU64,
    finalized_by_sweep: AtomicU64,
    emitted: AtomicU64,
    not_qualified: AtomicU64,
    abandoned: AtomicU64,
    sweep_panics: AtomicU64,
    undelivered: AtomicU64,
    lines_written: AtomicU64,
    write_failures: AtomicU64,
    rotations: AtomicU64,
}

/// Which path finalized a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizedBy {
    Update,
    Sweep,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discard(&self, reason: Discard) {
        self.discarded[reason as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merged(&self) {
        self.merged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finalized(&self, by: FinalizedBy, qualified: bool) {
        match by {
            FinalizedBy::Update => self.finalized_on_update.fetch_add(1, Ordering::Relaxed),
            FinalizedBy::Sweep => self.finalized_by_sweep.fetch_add(1, Ordering::Relaxed),
        };
        if !qualified {
            self.not_qualified.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A qualified snapshot was accepted by the result queue.
    pub fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sweep_panic(&self) {
        self.sweep_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_undelivered(&self) {
        self.undelivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_line_written(&self) {
        self.lines_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            events: load(&self.events),
            discarded: Discard::ALL
                .iter()
                .map(|&reason| (reason, load(&self.discarded[reason as usize])))
                .collect(),
            created: load(&self.created),
            merged: load(&self.merged),
            finalized_on_update: load(&self.finalized_on_update),
            finalized_by_sweep: load(&self.finalized_by_sweep),
            emitted: load(&self.emitted),
            not_qualified: load(&self.not_qualified),
            abandoned: load(&self.abandoned),
            sweep_panics: load(&self.sweep_panics),
            undelivered: load(&self.undelivered),
            lines_written: load(&self.lines_written),
            write_failures: load(&self.write_failures),
            rotations: load(&self.rotations),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub events: u64,
    pub discarded: Vec<(Discard, u64)>,
    pub created: u64,
    pub merged: u64,
    pub finalized_on_update: u64,
    pub finalized_by_sweep: u64,
    pub emitted: u64,
    pub not_qualified: u64,
    pub abandoned: u64,
    pub sweep_panics: u64,
    pub undelivered: u64,
    pub lines_written: u64,
    pub write_failures: u64,
    pub rotations: u64,
}

impl StatsSnapshot {
    pub fn discarded(&self, reason: Discard) -> u64 {
        self.discarded
            .iter()
            .find(|(r, _)| *r == reason)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn total_discarded(&self) -> u64 {
        self.discarded.iter().map(|(_, n)| n).sum()
    }
}
