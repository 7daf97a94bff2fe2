use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::diversity::diversity;

/// Seconds to a [`Duration`], saturating where chrono's range ends.
fn seconds(secs: i64) -> Duration {
    Duration::try_seconds(secs).unwrap_or(if secs < 0 { Duration::MIN } else { Duration::MAX })
}

/// A-record type code.
pub const RECORD_TYPE_A: u16 = 1;

/// Per-event and per-record thresholds of the flux heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Events with a longer TTL are never flux candidates (seconds).
    pub max_suspicious_ttl: u32,
    pub min_suspicious_set_size: usize,
    pub min_suspicious_diversity: f64,
    pub min_total_set_size: usize,
    pub min_total_diversity: f64,
    pub min_total_query_volume: u64,
    /// Small address sets are still kept when the TTL is at most this (seconds).
    pub very_short_ttl: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_suspicious_ttl: 3 * 3600,
            min_suspicious_set_size: 3,
            min_suspicious_diversity: 1.0 / 3.0,
            min_total_set_size: 3,
            min_total_diversity: 0.5,
            min_total_query_volume: 1,
            very_short_ttl: 30,
        }
    }
}

impl Thresholds {
    /// Emission predicate shared by the update path and the sweeper.
    ///
    /// An address set the scorer rejects never qualifies.
    pub fn qualifies<'a, I>(&self, addresses: I, set_size: usize, query_volume: u64) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        set_size >= self.min_total_set_size
            && query_volume >= self.min_total_query_volume
            && diversity(addresses).is_ok_and(|d| d >= self.min_total_diversity)
    }
}

/// How finalized candidates are rendered in the output log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LineFormat {
    /// Space-delimited fields.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub prefix: String,
    /// Seconds a log file stays open before rotating.
    pub rotation_interval: i64,
    pub format: LineFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("CANDIDATE_FLUX_DOMAINS"),
            prefix: "candidate_flux_domains".to_string(),
            rotation_interval: 3600,
            format: LineFormat::Text,
        }
    }
}

impl LogConfig {
    pub fn rotation_interval(&self) -> Duration {
        seconds(self.rotation_interval)
    }
}

/// Full engine configuration, built once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub thresholds: Thresholds,
    /// Seconds a domain is tracked before its aggregate may be finalized.
    pub observation_window: i64,
    /// Sweep period, and the minimum age since first processing before the
    /// update path may finalize a record (seconds).
    pub probe_interval: i64,
    /// Bound of the result queue; producers block when it is full.
    pub queue_capacity: usize,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            observation_window: 12 * 3600,
            probe_interval: 600,
            queue_capacity: 65_536,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    pub fn observation_window(&self) -> Duration {
        seconds(self.observation_window)
    }

    pub fn probe_interval(&self) -> Duration {
        seconds(self.probe_interval)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, secs) in [
            ("observation window", self.observation_window),
            ("probe interval", self.probe_interval),
            ("rotation interval", self.log.rotation_interval),
        ] {
            if secs <= 0 {
                anyhow::bail!("{} must be greater than 0", name);
            }
            if Duration::try_seconds(secs).is_none() {
                anyhow::bail!("{} of {} seconds is out of range", name, secs);
            }
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("queue capacity must be greater than 0");
        }
        if self.log.prefix.trim().is_empty() {
            anyhow::bail!("log file prefix must not be empty");
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("min suspicious diversity", t.min_suspicious_diversity),
            ("min total diversity", t.min_total_diversity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, value);
            }
        }

        Ok(())
    }
}
