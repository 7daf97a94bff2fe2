//! Decoded telemetry events as delivered by the feed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "EXPIRATION")]
    Expiration,
    #[serde(rename = "INSERTION")]
    Insertion,
    #[serde(other)]
    Other,
}

/// One cache-expiration observation for a single owner name.
///
/// Timestamps are epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsEvent {
    pub event_kind: EventKind,
    pub record_type: u16,
    pub ttl: u32,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub query_count: u64,
    pub first_seen: i64,
    #[serde(default)]
    pub last_seen: Option<i64>,
    pub processed_at: i64,
    pub domain_name: String,
}
