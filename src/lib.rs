pub mod args;
pub mod candidate;
pub mod config;
pub mod diversity;
pub mod domain;
pub mod error;
pub mod event;
pub mod ingest;
pub mod logger;
pub mod monitor;
pub mod replay;
pub mod report;
pub mod stats;
pub mod store;
pub mod sweeper;
pub mod utils;

pub use args::Args;
pub use candidate::{CandidateRecord, ResultRecord};
pub use config::Config;
pub use error::{Error, Result};
pub use event::{DnsEvent, EventKind};
pub use monitor::{FluxMonitor, SweepMode};
pub use stats::StatsSnapshot;
