//! Mutex-guarded map from domain name to its candidate record.
//!
//! One coarse lock covers every read, create, update and delete. Each public
//! method takes the lock for exactly one key (or one key snapshot) and drops it
//! before returning, so the sweeper and the ingest path interleave per key.

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::trace;

use crate::candidate::{CandidateRecord, Observation};
use crate::error::{Error, Result};

/// What an upsert did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    Created,
    Merged,
    /// Merged, then removed in the same critical section.
    Evicted(CandidateRecord),
}

impl Upsert {
    pub fn is_created(&self) -> bool {
        matches!(self, Upsert::Created)
    }
}

#[derive(Debug, Default)]
pub struct CandidateStore {
    records: Mutex<HashMap<String, CandidateRecord>>,
}

impl CandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or merge the record for `obs.domain`.
    ///
    /// `finalize_when` is only consulted after a merge into an existing record;
    /// when it returns true the record leaves the store under the same lock.
    pub fn upsert<F>(&self, obs: Observation, finalize_when: F) -> Upsert
    where
        F: FnOnce(&CandidateRecord) -> bool,
    {
        let mut records = self.records.lock();

        let mut slot = match records.entry(obs.domain.clone()) {
            Entry::Vacant(slot) => {
                trace!(action = "create", component = "candidate_store", domain = %obs.domain, "New candidate");
                slot.insert(CandidateRecord::new(obs));
                return Upsert::Created;
            }
            Entry::Occupied(slot) => slot,
        };

        slot.get_mut().merge(obs);
        if finalize_when(slot.get()) {
            Upsert::Evicted(slot.remove())
        } else {
            Upsert::Merged
        }
    }

    /// Snapshot of the current key set.
    pub fn keys(&self) -> Vec<String> {
        self.records.lock().keys().cloned().collect()
    }

    /// Remove `key` when `predicate` holds for its current record.
    ///
    /// Returns [`Error::MissingKey`] when the key was deleted since the caller
    /// last saw it.
    pub fn evict_if<P>(&self, key: &str, predicate: P) -> Result<Option<CandidateRecord>>
    where
        P: FnOnce(&CandidateRecord) -> bool,
    {
        let mut records = self.records.lock();
        let record = records
            .get(key)
            .ok_or_else(|| Error::MissingKey(key.to_string()))?;

        if predicate(record) {
            Ok(records.remove(key))
        } else {
            Ok(None)
        }
    }

    /// Run [`evict_if`](Self::evict_if) over a key snapshot, one lock
    /// acquisition per key. `on_evicted` sees every removed record and every
    /// per-key failure after that key's lock is released. Returns the number
    /// of keys scanned.
    pub fn scan_and_evict<P, F>(&self, predicate: P, mut on_evicted: F) -> usize
    where
        P: Fn(&CandidateRecord) -> bool,
        F: FnMut(&str, Result<CandidateRecord>),
    {
        let keys = self.keys();
        for key in &keys {
            match self.evict_if(key, &predicate) {
                Ok(None) => {}
                Ok(Some(record)) => on_evicted(key, Ok(record)),
                Err(e) => on_evicted(key, Err(e)),
            }
        }
        keys.len()
    }

    pub fn get(&self, key: &str) -> Option<CandidateRecord> {
        self.records.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
