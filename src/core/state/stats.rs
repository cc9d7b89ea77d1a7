// src/core/state/stats.rs

//! Contains state definitions and logic for server statistics.

use super::client::{ConnectionRow, ConnectionSnapshot};
use crate::core::metrics;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

/// Holds all server-wide counters plus the live per-connection rows.
#[derive(Debug)]
pub struct ServerStats {
    started: DateTime<Utc>,
    /// Unix seconds of the most recent open, or 0 when nothing connected yet.
    last_connection: AtomicI64,
    total_connections: AtomicU64,
    open_connections: AtomicUsize,
    stalls: AtomicU64,
    total_lines: AtomicU64,
    rows: DashMap<u64, Arc<ConnectionRow>>,
}

/// The aggregate block of the stats report.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateStats {
    pub now: DateTime<Utc>,
    pub up_since: DateTime<Utc>,
    pub last_connection: Option<DateTime<Utc>>,
    pub total_connections: u64,
    pub open_connections: usize,
    pub open_fds: usize,
    pub stalls: u64,
    pub total_lines: u64,
    pub usage: ProcessUsage,
}

/// CPU and memory figures taken from `getrusage`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessUsage {
    pub user_secs: f64,
    pub sys_secs: f64,
    pub max_rss_kb: i64,
}

/// A consistent copy of the counters and the rows, ordered by open time.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub aggregate: AggregateStats,
    pub connections: Vec<ConnectionSnapshot>,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started: Utc::now(),
            last_connection: AtomicI64::new(0),
            total_connections: AtomicU64::new(0),
            open_connections: AtomicUsize::new(0),
            stalls: AtomicU64::new(0),
            total_lines: AtomicU64::new(0),
            rows: DashMap::new(),
        }
    }

    /// Records a newly admitted connection and starts reporting its row.
    pub fn on_connection_open(&self, row: Arc<ConnectionRow>) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.open_connections.fetch_add(1, Ordering::AcqRel);
        self.last_connection
            .store(Utc::now().timestamp(), Ordering::Relaxed);
        self.rows.insert(row.session_id, row);
        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
        metrics::CONNECTED_CLIENTS.inc();
    }

    /// Drops the connection's row and decrements the open count.
    pub fn on_connection_close(&self, session_id: u64) {
        if self.rows.remove(&session_id).is_none() {
            return;
        }
        let _ = self
            .open_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(1))
            });
        metrics::CONNECTED_CLIENTS.dec();
    }

    pub fn on_line_received(&self) {
        self.total_lines.fetch_add(1, Ordering::Relaxed);
        metrics::LINES_RECEIVED_TOTAL.inc();
    }

    pub fn on_stall(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
        metrics::CONNECTION_STALLS_TOTAL.inc();
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::Acquire)
    }

    pub fn stalls(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines.load(Ordering::Relaxed)
    }

    pub fn last_connection(&self) -> Option<DateTime<Utc>> {
        match self.last_connection.load(Ordering::Relaxed) {
            0 => None,
            secs => Utc.timestamp_opt(secs, 0).single(),
        }
    }

    /// Copies every row, so the report can be built without holding any lock.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut connections: Vec<ConnectionSnapshot> =
            self.rows.iter().map(|entry| entry.value().snapshot()).collect();
        connections.sort_by(|a, b| {
            a.opened
                .cmp(&b.opened)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });

        StatsSnapshot {
            aggregate: AggregateStats {
                now: Utc::now(),
                up_since: self.started,
                last_connection: self.last_connection(),
                total_connections: self.total_connections(),
                open_connections: self.open_connections(),
                open_fds: count_open_fds(),
                stalls: self.stalls(),
                total_lines: self.total_lines(),
                usage: process_usage(),
            },
            connections,
        }
    }
}

/// Counts this process's open file descriptors; 0 where `/proc` is unavailable.
fn count_open_fds() -> usize {
    std::fs::read_dir("/proc/self/fd")
        .map(|entries| entries.count())
        .unwrap_or(0)
}

fn process_usage() -> ProcessUsage {
    // SAFETY: `rusage` is plain old data and `getrusage` only writes into it.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return ProcessUsage::default();
    }
    let secs = |tv: libc::timeval| tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0;
    ProcessUsage {
        user_secs: secs(usage.ru_utime),
        sys_secs: secs(usage.ru_stime),
        max_rss_kb: usage.ru_maxrss as i64,
    }
}
