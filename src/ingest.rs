//! Per-event screening and merge policy.
//!
//! Every event from the feed passes through [`IngestAdapter::ingest`]. Events
//! that fail a check are dropped and counted; the rest are merged into the
//! [`CandidateStore`]. A merge that pushes a record past both its observation
//! window and the probe interval finalizes it on the spot.

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::candidate::{CandidateRecord, Observation, ResultRecord};
use crate::config::{Config, RECORD_TYPE_A};
use crate::diversity::diversity;
use crate::domain::{canonical_address, canonical_domain};
use crate::event::{DnsEvent, EventKind};
use crate::stats::{FinalizedBy, Stats};
use crate::store::{CandidateStore, Upsert};

/// Why an event was dropped before reaching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Discard {
    NotExpiration,
    WrongRecordType,
    TtlTooLong,
    InsufficientEvidence,
    UnsupportedAddress,
    LowDiversity,
    DegenerateSample,
    MalformedDomain,
    MalformedTimestamp,
    /// Raw feed input that could not be decoded into an event.
    Unparsable,
}

impl Discard {
    pub const ALL: [Discard; 10] = [
        Discard::NotExpiration,
        Discard::WrongRecordType,
        Discard::TtlTooLong,
        Discard::InsufficientEvidence,
        Discard::UnsupportedAddress,
        Discard::LowDiversity,
        Discard::DegenerateSample,
        Discard::MalformedDomain,
        Discard::MalformedTimestamp,
        Discard::Unparsable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Discard::NotExpiration => "not an expiration event",
            Discard::WrongRecordType => "not an A record",
            Discard::TtlTooLong => "ttl above suspicious maximum",
            Discard::InsufficientEvidence => "small set with ordinary ttl",
            Discard::UnsupportedAddress => "unsupported address format",
            Discard::LowDiversity => "low address diversity",
            Discard::DegenerateSample => "zero elapsed time",
            Discard::MalformedDomain => "empty domain name",
            Discard::MalformedTimestamp => "timestamp out of range",
            Discard::Unparsable => "unparsable input",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Discarded(Discard),
    Created,
    Merged,
    /// The update path closed the record; `emitted` tells whether its snapshot
    /// reached the result queue.
    Finalized { emitted: bool },
}

/// Source of `emitted_at` for snapshots closed by the update path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampClock {
    /// Wall clock, as used by a background sweeper.
    Wall,
    /// The finalizing event's `processed_at`, as used by sweeps driven on event time.
    Event,
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, Discard> {
    DateTime::from_timestamp(secs, 0).ok_or(Discard::MalformedTimestamp)
}

/// Apply the event filters in order and build the observation to merge.
pub fn screen(event: &DnsEvent, config: &Config) -> Result<Observation, Discard> {
    let t = &config.thresholds;

    if event.event_kind != EventKind::Expiration {
        return Err(Discard::NotExpiration);
    }
    if event.record_type != RECORD_TYPE_A {
        return Err(Discard::WrongRecordType);
    }
    if event.ttl > t.max_suspicious_ttl {
        return Err(Discard::TtlTooLong);
    }

    // Size checks use the raw record count, diversity uses the de-duplicated set.
    let raw_len = event.addresses.len();
    if raw_len < t.min_suspicious_set_size && event.ttl > t.very_short_ttl {
        return Err(Discard::InsufficientEvidence);
    }

    let addresses: BTreeSet<String> = event
        .addresses
        .iter()
        .map(|a| canonical_address(a))
        .collect();
    let score = diversity(&addresses).map_err(|_| Discard::UnsupportedAddress)?;
    if raw_len >= t.min_suspicious_set_size && score < t.min_suspicious_diversity {
        return Err(Discard::LowDiversity);
    }

    let last_seen = event.last_seen.unwrap_or(event.first_seen);
    if event.processed_at == event.first_seen {
        return Err(Discard::DegenerateSample);
    }

    let domain = canonical_domain(&event.domain_name).ok_or(Discard::MalformedDomain)?;

    Ok(Observation {
        domain,
        ttl: event.ttl,
        addresses,
        query_count: event.query_count,
        first_seen: timestamp(event.first_seen)?,
        last_seen: timestamp(last_seen)?,
        processed_at: timestamp(event.processed_at)?,
    })
}

/// Screens events and merges survivors into the store.
///
/// Safe to call from any thread.
pub struct IngestAdapter {
    config: Arc<Config>,
    store: Arc<CandidateStore>,
    results: Sender<ResultRecord>,
    stats: Arc<Stats>,
    stamp: StampClock,
}

impl IngestAdapter {
    pub fn new(
        config: Arc<Config>,
        store: Arc<CandidateStore>,
        results: Sender<ResultRecord>,
        stats: Arc<Stats>,
        stamp: StampClock,
    ) -> Self {
        Self {
            config,
            store,
            results,
            stats,
            stamp,
        }
    }

    pub fn ingest(&self, event: &DnsEvent) -> IngestOutcome {
        self.stats.record_event();

        let obs = match screen(event, &self.config) {
            Ok(obs) => obs,
            Err(reason) => {
                self.stats.record_discard(reason);
                trace!(action = "discard", component = "ingest", domain = %event.domain_name, reason = reason.as_str(), "Event discarded");
                return IngestOutcome::Discarded(reason);
            }
        };

        let processed_at = obs.processed_at;
        let window = self.config.observation_window();
        let probe = self.config.probe_interval();

        let upsert = self.store.upsert(obs, |record| {
            processed_at - record.first_seen >= window
                && processed_at - record.first_processed_at() >= probe
        });

        match upsert {
            Upsert::Created => {
                self.stats.record_created();
                IngestOutcome::Created
            }
            Upsert::Merged => {
                self.stats.record_merged();
                IngestOutcome::Merged
            }
            Upsert::Evicted(record) => {
                self.stats.record_merged();
                let emitted = self.finalize(record, processed_at);
                IngestOutcome::Finalized { emitted }
            }
        }
    }

    /// Evaluate an evicted record and queue its snapshot if it qualifies.
    /// Runs after the store lock is released.
    fn finalize(&self, record: CandidateRecord, processed_at: DateTime<Utc>) -> bool {
        let qualified = record.qualifies(&self.config.thresholds);
        self.stats.record_finalized(FinalizedBy::Update, qualified);

        if !qualified {
            debug!(action = "evict", component = "ingest", domain = record.domain(), "Candidate closed without qualifying");
            return false;
        }

        debug!(action = "emit", component = "ingest", domain = record.domain(), observations = record.observation_count, "Candidate qualified");
        let emitted_at = match self.stamp {
            StampClock::Wall => Utc::now(),
            StampClock::Event => processed_at,
        };
        if let Err(e) = self.results.send(record.snapshot(emitted_at)) {
            self.stats.record_undelivered();
            warn!(action = "emit", component = "ingest", domain = %e.0.domain, "Result queue closed, candidate not logged");
            return false;
        }
        self.stats.record_emitted();
        true
    }
}
