use clap::Parser;
use std::path::PathBuf;

use crate::config::{Config, LineFormat, LogConfig, Thresholds};

#[derive(Parser, Debug)]
#[command(
    name = "fluxwatch",
    about = "Aggregate DNS expiration events and log candidate fast-flux domains",
    version,
    long_about = None
)]
pub struct Args {
    /// JSON-lines event files to replay (`.gz` accepted); reads stdin when empty
    pub inputs: Vec<PathBuf>,

    /// Directory for candidate log files
    #[arg(long, default_value = "CANDIDATE_FLUX_DOMAINS")]
    pub log_dir: PathBuf,

    /// Candidate log file name prefix
    #[arg(long, default_value = "candidate_flux_domains")]
    pub log_prefix: String,

    /// Seconds before the candidate log rotates
    #[arg(long, default_value_t = 3600)]
    pub rotation_interval: i64,

    /// Candidate log line format
    #[arg(long, value_enum, default_value_t = LineFormat::Text)]
    pub format: LineFormat,

    /// Events with a longer TTL are ignored (seconds)
    #[arg(long, default_value_t = 3 * 3600)]
    pub max_suspicious_ttl: u32,

    /// Minimum per-event address count before diversity is required
    #[arg(long, default_value_t = 3)]
    pub min_suspicious_set_size: usize,

    /// Minimum per-event diversity for larger address sets
    #[arg(long, default_value_t = 1.0 / 3.0)]
    pub min_suspicious_diversity: f64,

    /// Minimum aggregated address count to log a domain
    #[arg(long, default_value_t = 3)]
    pub min_total_set_size: usize,

    /// Minimum aggregated diversity to log a domain
    #[arg(long, default_value_t = 0.5)]
    pub min_total_diversity: f64,

    /// Minimum aggregated query volume to log a domain
    #[arg(long, default_value_t = 1)]
    pub min_total_query_volume: u64,

    /// Small address sets are kept when the TTL is at most this (seconds)
    #[arg(long, default_value_t = 30)]
    pub very_short_ttl: u32,

    /// Seconds a domain is tracked before it can be finalized
    #[arg(long, default_value_t = 12 * 3600)]
    pub observation_window: i64,

    /// Sweep period and minimum record age for update-path finalization (seconds)
    #[arg(long, default_value_t = 600)]
    pub probe_interval: i64,

    /// Finalized candidates buffered before producers block
    #[arg(long, default_value_t = 65_536)]
    pub queue_capacity: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Number of parser threads for replay
    #[arg(short, long)]
    pub workers: Option<usize>,
}

impl Args {
    pub fn to_config(&self) -> Config {
        Config {
            thresholds: Thresholds {
                max_suspicious_ttl: self.max_suspicious_ttl,
                min_suspicious_set_size: self.min_suspicious_set_size,
                min_suspicious_diversity: self.min_suspicious_diversity,
                min_total_set_size: self.min_total_set_size,
                min_total_diversity: self.min_total_diversity,
                min_total_query_volume: self.min_total_query_volume,
                very_short_ttl: self.very_short_ttl,
            },
            observation_window: self.observation_window,
            probe_interval: self.probe_interval,
            queue_capacity: self.queue_capacity,
            log: LogConfig {
                dir: self.log_dir.clone(),
                prefix: self.log_prefix.clone(),
                rotation_interval: self.rotation_interval,
                format: self.format,
            },
        }
    }
}
