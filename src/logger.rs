//! Rotating gzip log of finalized candidates.
//!
//! Files are named `{prefix}.{unix_ts}.gz`, where the timestamp is the moment
//! the file was opened. Each record is flushed as soon as it is written, so a
//! crash loses at most the gzip trailer of the open file.

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::candidate::ResultRecord;
use crate::config::{LineFormat, LogConfig};
use crate::error::Result;
use crate::stats::Stats;

struct OpenLog {
    path: PathBuf,
    encoder: GzEncoder<File>,
    opened_at: DateTime<Utc>,
    lines: u64,
}

impl OpenLog {
    fn finish(self) -> io::Result<(PathBuf, u64)> {
        self.encoder.finish()?.sync_all()?;
        Ok((self.path, self.lines))
    }
}

pub struct CandidateLogger {
    config: LogConfig,
    stats: Arc<Stats>,
    current: Option<OpenLog>,
}

/// Path of the log file opened at `opened_at`.
pub fn log_file_path(config: &LogConfig, opened_at: DateTime<Utc>) -> PathBuf {
    config
        .dir
        .join(format!("{}.{}.gz", config.prefix, opened_at.timestamp()))
}

/// Render one record in the configured line format, without the newline.
pub fn format_line(record: &ResultRecord, format: LineFormat) -> Result<String> {
    Ok(match format {
        LineFormat::Text => record.to_string(),
        LineFormat::Json => serde_json::to_string(record)?,
    })
}

impl CandidateLogger {
    /// Create the output directory if needed and open the first file.
    pub fn open(config: LogConfig, stats: Arc<Stats>, now: DateTime<Utc>) -> Result<Self> {
        if !config.dir.exists() {
            fs::create_dir_all(&config.dir)?;
            info!(action = "create", component = "candidate_logger", dir = ?config.dir, "Created log directory");
        }

        let mut logger = Self {
            config,
            stats,
            current: None,
        };
        logger.current = Some(logger.open_file(now)?);
        Ok(logger)
    }

    fn open_file(&self, now: DateTime<Utc>) -> Result<OpenLog> {
        let path = log_file_path(&self.config, now);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(action = "open", component = "candidate_logger", path = ?path, "Opened candidate log");

        Ok(OpenLog {
            path,
            encoder: GzEncoder::new(file, Compression::default()),
            opened_at: now,
            lines: 0,
        })
    }

    /// Path of the file currently receiving records.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|log| log.path.as_path())
    }

    fn rotate(&mut self, now: DateTime<Utc>) -> Result<()> {
        if let Some(log) = self.current.take() {
            let (path, lines) = log.finish()?;
            info!(action = "rotate", component = "candidate_logger", path = ?path, lines, "Closed candidate log");
            self.stats.record_rotation();
        }
        self.current = Some(self.open_file(now)?);
        Ok(())
    }

    /// Append one record, rotating first when the open file is older than the
    /// rotation interval.
    pub fn write_at(&mut self, record: &ResultRecord, now: DateTime<Utc>) -> Result<()> {
        let expired = match &self.current {
            Some(log) => now - log.opened_at > self.config.rotation_interval(),
            None => true,
        };
        if expired {
            self.rotate(now)?;
        }

        let line = format_line(record, self.config.format)?;
        if let Some(log) = self.current.as_mut() {
            log.encoder.write_all(line.as_bytes())?;
            log.encoder.write_all(b"\n")?;
            log.encoder.flush()?;
            log.lines += 1;
        }

        self.stats.record_line_written();
        debug!(action = "write", component = "candidate_logger", domain = %record.domain, "Logged candidate");
        Ok(())
    }

    /// Close the open file, writing the gzip trailer.
    pub fn finish(&mut self) -> Result<Option<PathBuf>> {
        match self.current.take() {
            Some(log) => {
                let (path, lines) = log.finish()?;
                info!(action = "close", component = "candidate_logger", path = ?path, lines, "Closed candidate log");
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }

    /// Drain `results` until every producer has hung up, then close the file.
    pub fn run(mut self, results: Receiver<ResultRecord>) -> Result<()> {
        info!(action = "start", component = "candidate_logger", dir = ?self.config.dir, "Candidate logger started");

        for record in results.iter() {
            if let Err(e) = self.write_at(&record, Utc::now()) {
                self.stats.record_write_failure();
                error!(action = "write", component = "candidate_logger", domain = %record.domain, error = %e, "Failed to log candidate");
            }
            debug!(action = "status", component = "candidate_logger", queued = results.len(), "Result queue depth");
        }

        self.finish()?;
        info!(action = "stop", component = "candidate_logger", "Candidate logger stopped");
        Ok(())
    }

    pub fn spawn(self, results: Receiver<ResultRecord>) -> io::Result<JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("flux-logger".to_string())
            .spawn(move || self.run(results))
    }
}

impl Drop for CandidateLogger {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("Error closing candidate log on drop: {}", e);
        }
    }
}
