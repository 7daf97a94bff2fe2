//! Error types for the aggregation engine.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised inside the engine.
///
/// None of these ever reach the feed: ingestion discards are reported as
/// [`crate::ingest::Discard`] values, and per-key failures are abandoned and counted.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A key vanished between the key snapshot and the per-key re-fetch.
    #[error("candidate '{0}' is no longer in the store")]
    MissingKey(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
