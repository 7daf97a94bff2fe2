//! Per-domain aggregate state and the snapshot emitted when it is finalized.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::config::Thresholds;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A filtered event, ready to be merged into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub domain: String,
    pub ttl: u32,
    pub addresses: BTreeSet<String>,
    pub query_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    domain: String,
    pub observation_count: u64,
    pub ttl_min: u32,
    pub ttl_max: u32,
    pub ttl_avg: f64,
    pub addresses: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    first_processed_at: DateTime<Utc>,
    pub query_volume: u64,
    /// Address-set size after creation and after every merge.
    pub growth: Vec<usize>,
}

impl CandidateRecord {
    pub fn new(obs: Observation) -> Self {
        let growth = vec![obs.addresses.len()];
        Self {
            domain: obs.domain,
            observation_count: 1,
            ttl_min: obs.ttl,
            ttl_max: obs.ttl,
            ttl_avg: obs.ttl as f64,
            addresses: obs.addresses,
            first_seen: obs.first_seen,
            last_seen: obs.last_seen.max(obs.first_seen),
            first_processed_at: obs.processed_at,
            query_volume: obs.query_count,
            growth,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn first_processed_at(&self) -> DateTime<Utc> {
        self.first_processed_at
    }

    pub fn merge(&mut self, obs: Observation) {
        self.observation_count += 1;

        self.ttl_min = self.ttl_min.min(obs.ttl);
        self.ttl_max = self.ttl_max.max(obs.ttl);
        let n = self.observation_count as f64;
        self.ttl_avg = ((self.ttl_avg * (n - 1.0) + obs.ttl as f64) / n)
            .clamp(self.ttl_min as f64, self.ttl_max as f64);

        self.addresses.extend(obs.addresses);
        self.growth.push(self.addresses.len());

        self.first_seen = self.first_seen.min(obs.first_seen);
        self.last_seen = self.last_seen.max(obs.last_seen).max(self.first_seen);

        self.query_volume = self.query_volume.saturating_add(obs.query_count);
    }

    pub fn qualifies(&self, thresholds: &Thresholds) -> bool {
        thresholds.qualifies(&self.addresses, self.addresses.len(), self.query_volume)
    }

    pub fn snapshot(&self, emitted_at: DateTime<Utc>) -> ResultRecord {
        ResultRecord {
            domain: self.domain.clone(),
            observation_count: self.observation_count,
            query_volume: self.query_volume,
            ttl_avg: self.ttl_avg,
            ttl_min: self.ttl_min,
            ttl_max: self.ttl_max,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            emitted_at,
            address_set_size: self.addresses.len(),
            addresses: self.addresses.iter().cloned().collect(),
            growth: self.growth.clone(),
        }
    }
}

/// Immutable snapshot of a finalized candidate, one line in the output log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub domain: String,
    pub observation_count: u64,
    pub query_volume: u64,
    pub ttl_avg: f64,
    pub ttl_min: u32,
    pub ttl_max: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub emitted_at: DateTime<Utc>,
    pub address_set_size: usize,
    pub addresses: Vec<String>,
    pub growth: Vec<usize>,
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let growth: Vec<String> = self.growth.iter().map(|g| g.to_string()).collect();
        write!(
            f,
            "{} {} {} {} {} {} {} {} {} {} [{}] [{}]",
            self.domain,
            self.observation_count,
            self.query_volume,
            self.ttl_avg,
            self.ttl_min,
            self.ttl_max,
            self.first_seen.format(TIMESTAMP_FORMAT),
            self.last_seen.format(TIMESTAMP_FORMAT),
            self.emitted_at.format(TIMESTAMP_FORMAT),
            self.address_set_size,
            self.addresses.join(","),
            growth.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn obs(ttl: u32, addrs: &[&str], count: u64, first: i64, last: i64) -> Observation {
        Observation {
            domain: "flux.example".to_string(),
            ttl,
            addresses: addrs.iter().map(|a| a.to_string()).collect(),
            query_count: count,
            first_seen: at(first),
            last_seen: at(last),
            processed_at: at(last + 10),
        }
    }

    #[test]
    fn test_new_record_initial_state() {
        let record = CandidateRecord::new(obs(20, &["1.1.1.1", "2.2.2.2"], 7, 100, 150));
        assert_eq!(record.observation_count, 1);
        assert_eq!(record.ttl_min, 20);
        assert_eq!(record.ttl_max, 20);
        assert_eq!(record.ttl_avg, 20.0);
        assert_eq!(record.query_volume, 7);
        assert_eq!(record.growth, vec![2]);
        assert_eq!(record.first_processed_at(), at(160));
    }

    #[test]
    fn test_merge_two_events() {
        let mut record = CandidateRecord::new(obs(20, &["1.1.1.1", "2.2.2.2"], 7, 100, 150));
        record.merge(obs(60, &["2.2.2.2", "3.3.3.3"], 5, 90, 140));

        assert_eq!(record.observation_count, 2);
        assert_eq!(record.ttl_min, 20);
        assert_eq!(record.ttl_max, 60);
        assert_eq!(record.ttl_avg, 40.0);
        assert_eq!(record.query_volume, 12);
        assert_eq!(record.addresses.len(), 3);
        assert_eq!(record.growth, vec![2, 3]);
        assert_eq!(record.first_seen, at(90));
        assert_eq!(record.last_seen, at(150));
        // creation time is never moved by a merge
        assert_eq!(record.first_processed_at(), at(160));
    }

    #[test]
    fn test_weighted_mean_over_many_merges() {
        let ttls = [10u32, 30, 5, 300, 42];
        let mut record = CandidateRecord::new(obs(ttls[0], &["1.1.1.1"], 1, 0, 0));
        for &ttl in &ttls[1..] {
            record.merge(obs(ttl, &["1.1.1.1"], 1, 0, 0));
            assert!(record.ttl_min as f64 <= record.ttl_avg);
            assert!(record.ttl_avg <= record.ttl_max as f64);
            assert!(record.first_seen <= record.last_seen);
        }
        let expected = ttls.iter().map(|&t| t as f64).sum::<f64>() / ttls.len() as f64;
        assert!((record.ttl_avg - expected).abs() < 1e-9);
        assert_eq!(record.ttl_min, 5);
        assert_eq!(record.ttl_max, 300);
    }

    #[test]
    fn test_inverted_event_window_keeps_order() {
        let record = CandidateRecord::new(obs(20, &["1.1.1.1"], 1, 200, 100));
        assert!(record.first_seen <= record.last_seen);
    }

    #[test]
    fn test_text_line() {
        let mut record = CandidateRecord::new(obs(20, &["2.2.2.2", "1.1.1.1"], 3, 0, 60));
        record.merge(obs(20, &["3.3.3.3"], 2, 0, 60));
        let line = record.snapshot(at(3600)).to_string();

        assert_eq!(
            line,
            "flux.example 2 5 20 20 20 1970-01-01T00:00:00 1970-01-01T00:01:00 \
             1970-01-01T01:00:00 3 [1.1.1.1,2.2.2.2,3.3.3.3] [2,3]"
        );
        assert_eq!(line.split(' ').count(), 12);
    }
}
