//! End-to-end checks: events in, gzip candidate log out.

use chrono::{DateTime, Utc};
use flate2::read::MultiGzDecoder;
use fluxwatch::config::{LogConfig, RECORD_TYPE_A};
use fluxwatch::ingest::{Discard, IngestOutcome};
use fluxwatch::{Config, DnsEvent, EventKind, FluxMonitor, SweepMode};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const T0: i64 = 1_700_000_000;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn config(dir: &Path) -> Config {
    Config {
        log: LogConfig {
            dir: dir.join("candidates"),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn event(domain: &str, ttl: u32, addrs: &[&str], count: u64, first: i64, processed: i64) -> DnsEvent {
    DnsEvent {
        event_kind: EventKind::Expiration,
        record_type: RECORD_TYPE_A,
        ttl,
        addresses: addrs.iter().map(|a| a.to_string()).collect(),
        query_count: count,
        first_seen: first,
        last_seen: None,
        processed_at: processed,
        domain_name: domain.to_string(),
    }
}

/// Every line of every log file in `dir`.
fn logged_lines(dir: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let mut text = String::new();
        MultiGzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        lines.extend(text.lines().map(str::to_string));
    }
    lines
}

fn lines_for<'a>(lines: &'a [String], domain: &str) -> Vec<&'a String> {
    lines
        .iter()
        .filter(|l| l.split(' ').next() == Some(domain))
        .collect()
}

const SPREAD: [&str; 5] = ["11.1.0.1", "12.2.0.1", "13.3.0.1", "14.4.0.1", "15.5.0.1"];

#[test]
fn test_single_event_domain_finalized_by_sweep() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let log_dir = config.log.dir.clone();
    let window = config.observation_window;
    let probe = config.probe_interval;
    let monitor = FluxMonitor::start(config, SweepMode::Manual).unwrap();

    let outcome = monitor.ingest(&event("evil.example", 20, &SPREAD, 10, T0, T0 + 100));
    assert_eq!(outcome, IngestOutcome::Created);
    assert!(monitor.store().contains("evil.example"));

    // Not yet: the window has not elapsed since first_seen.
    monitor.sweep_at(at(T0 + window));
    assert!(monitor.store().contains("evil.example"));

    let report = monitor.sweep_at(at(T0 + window + probe));
    assert_eq!(report.emitted, 1);
    assert!(!monitor.store().contains("evil.example"));

    let stats = monitor.shutdown().unwrap();
    assert_eq!(stats.lines_written, 1);

    let lines = logged_lines(&log_dir);
    let found = lines_for(&lines, "evil.example");
    assert_eq!(found.len(), 1);
    let fields: Vec<&str> = found[0].split(' ').collect();
    assert_eq!(fields.len(), 12);
    assert_eq!(fields[1], "1"); // observation count
    assert_eq!(fields[2], "10"); // query volume
    assert_eq!(fields[9], "5"); // address set size
}

#[test]
fn test_small_long_lived_set_never_stored() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let log_dir = config.log.dir.clone();
    let monitor = FluxMonitor::start(config, SweepMode::Manual).unwrap();

    let outcome = monitor.ingest(&event(
        "quiet.example",
        7200,
        &["10.1.0.1", "10.1.0.2"],
        10,
        T0,
        T0 + 100,
    ));
    assert_eq!(outcome, IngestOutcome::Discarded(Discard::InsufficientEvidence));
    assert!(!monitor.store().contains("quiet.example"));

    monitor.sweep_at(at(T0 + 10 * 86_400));
    let stats = monitor.shutdown().unwrap();
    assert_eq!(stats.created, 0);
    assert!(lines_for(&logged_lines(&log_dir), "quiet.example").is_empty());
}

#[test]
fn test_threshold_failures_evicted_but_never_logged() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let log_dir = config.log.dir.clone();
    let window = config.observation_window;
    let monitor = FluxMonitor::start(config, SweepMode::Manual).unwrap();

    // no queries
    monitor.ingest(&event("silent.example", 20, &SPREAD, 0, T0, T0 + 100));
    // two addresses only
    monitor.ingest(&event("pair.example", 20, &SPREAD[..2], 5, T0, T0 + 100));
    // passes every threshold
    monitor.ingest(&event("flux.example", 20, &SPREAD, 5, T0, T0 + 100));
    assert_eq!(monitor.store().len(), 3);

    let report = monitor.sweep_at(at(T0 + window + 1));
    assert_eq!(report.evicted, 3);
    assert_eq!(report.emitted, 1);
    assert!(monitor.store().is_empty());

    let stats = monitor.shutdown().unwrap();
    assert_eq!(stats.not_qualified, 2);

    let lines = logged_lines(&log_dir);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines_for(&lines, "flux.example").len(), 1);
}

#[test]
fn test_update_path_and_sweep_never_double_emit() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let log_dir = config.log.dir.clone();
    let window = config.observation_window;
    let probe = config.probe_interval;
    let monitor = FluxMonitor::start(config, SweepMode::Manual).unwrap();

    monitor.ingest(&event("flux.example", 20, &SPREAD[..3], 5, T0, T0 + 100));
    let outcome = monitor.ingest(&event("flux.example", 20, &SPREAD[3..], 5, T0, T0 + window + probe));
    assert_eq!(outcome, IngestOutcome::Finalized { emitted: true });

    // Nothing left for the sweeper to finalize.
    let report = monitor.sweep_at(at(T0 + 2 * window));
    assert_eq!(report.evicted, 0);

    let stats = monitor.shutdown().unwrap();
    assert_eq!(stats.emitted, 1);
    let lines = logged_lines(&log_dir);
    let found = lines_for(&lines, "flux.example");
    assert_eq!(found.len(), 1);
    assert!(found[0].starts_with("flux.example 2 10 20 20 20 "));

    // emitted_at is the finalizing event's processed_at, the same clock the sweeps use
    let fields: Vec<&str> = found[0].split(' ').collect();
    let stamp = at(T0 + window + probe).format("%Y-%m-%dT%H:%M:%S").to_string();
    assert_eq!(fields[8], stamp);
}

#[test]
fn test_concurrent_ingest_emits_each_domain_once() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let log_dir = config.log.dir.clone();
    let window = config.observation_window;
    let monitor = Arc::new(FluxMonitor::start(config, SweepMode::Manual).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || {
                for round in 0..3 {
                    for d in 0..50 {
                        let addrs = [
                            format!("{}.{}.0.1", 20 + t, round),
                            format!("{}.{}.0.1", 40 + t, round),
                            format!("{}.{}.0.1", 60 + t, round),
                        ];
                        let addrs: Vec<&str> = addrs.iter().map(String::as_str).collect();
                        monitor.ingest(&event(&format!("d{}.example", d), 20, &addrs, 1, T0, T0 + 100));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(monitor.store().len(), 50);
    let record = monitor.store().get("d0.example").unwrap();
    assert_eq!(record.observation_count, 12);
    assert_eq!(record.query_volume, 12);
    assert_eq!(record.addresses.len(), 36);

    let report = monitor.sweep_at(at(T0 + window + 1));
    assert_eq!(report.emitted, 50);

    let monitor = Arc::try_unwrap(monitor).ok().unwrap();
    monitor.shutdown().unwrap();

    let lines = logged_lines(&log_dir);
    assert_eq!(lines.len(), 50);
    for d in 0..50 {
        assert_eq!(lines_for(&lines, &format!("d{}.example", d)).len(), 1);
    }
}

#[test]
fn test_background_sweeper_finalizes_on_shutdown() {
    let tmp = TempDir::new().unwrap();
    let config = Config {
        observation_window: 60,
        probe_interval: 1,
        ..config(tmp.path())
    };
    let log_dir = config.log.dir.clone();
    let monitor = FluxMonitor::start(config, SweepMode::Background).unwrap();

    let now = Utc::now().timestamp();
    monitor.ingest(&event("stale.example", 20, &SPREAD, 3, now - 600, now - 500));
    monitor.ingest(&event("fresh.example", 20, &SPREAD, 3, now, now + 1));

    let stats = monitor.shutdown().unwrap();
    assert_eq!(stats.finalized_by_sweep, 1);

    let lines = logged_lines(&log_dir);
    assert_eq!(lines_for(&lines, "stale.example").len(), 1);
    assert!(lines_for(&lines, "fresh.example").is_empty());
}

#[test]
fn test_invalid_config_refused() {
    let tmp = TempDir::new().unwrap();
    let no_queue = Config {
        queue_capacity: 0,
        ..config(tmp.path())
    };
    assert!(FluxMonitor::start(no_queue, SweepMode::Manual).is_err());

    let endless_window = Config {
        observation_window: i64::MAX,
        ..config(tmp.path())
    };
    assert!(FluxMonitor::start(endless_window, SweepMode::Manual).is_err());
}

#[test]
fn test_single_address_short_ttl_is_tracked() {
    let tmp = TempDir::new().unwrap();
    let monitor = FluxMonitor::start(config(tmp.path()), SweepMode::Manual).unwrap();

    let outcome = monitor.ingest(&event("one.example", 10, &["198.51.100.7"], 1, T0, T0 + 100));
    assert_eq!(outcome, IngestOutcome::Created);
    assert!(monitor.store().contains("one.example"));
    monitor.shutdown().unwrap();
}
