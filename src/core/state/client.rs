// src/core/state/client.rs

//! Contains state definitions related to client connections.

use crate::connection::OutputQueue;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU64, AtomicUsize, Ordering};

/// Control handles for one live connection, keyed by session id.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub row: Arc<ConnectionRow>,
    pub output: OutputQueue,
}

pub type ClientMap = Arc<DashMap<u64, ConnectionEntry>>;

/// The lifecycle state shown in the STATE column of `stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Start = 0,
    IWait = 1,
    Run = 2,
    Close = 3,
    Down = 4,
}

impl ConnectionState {
    /// The fixed-width label used in the stats table.
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Start => "start",
            ConnectionState::IWait => "iwait",
            ConnectionState::Run => " run ",
            ConnectionState::Close => "close",
            ConnectionState::Down => "down ",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::IWait,
            2 => ConnectionState::Run,
            3 => ConnectionState::Close,
            4 => ConnectionState::Down,
            _ => ConnectionState::Start,
        }
    }
}

/// How bytes on the connection are currently interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionMode {
    Plain = 0,
    AwaitingUpgrade = 1,
    Framed = 2,
}

impl ConnectionMode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionMode::AwaitingUpgrade,
            2 => ConnectionMode::Framed,
            _ => ConnectionMode::Plain,
        }
    }
}

/// The live statistics row of one connection.
///
/// Every field the connection task mutates is an atomic, so a concurrent
/// `stats` reader never blocks the connection and vice versa.
#[derive(Debug)]
pub struct ConnectionRow {
    pub session_id: u64,
    pub addr: SocketAddr,
    pub opened: DateTime<Utc>,
    last_activity: AtomicI64,
    state: AtomicU8,
    mode: AtomicU8,
    line_count: AtomicU64,
    use_count: AtomicUsize,
    queue_size: AtomicUsize,
    eval_running: AtomicBool,
    pending_bytes: AtomicUsize,
    shell_name: RwLock<String>,
}

impl ConnectionRow {
    pub fn new(session_id: u64, addr: SocketAddr, mode: ConnectionMode) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            addr,
            opened: now,
            last_activity: AtomicI64::new(now.timestamp()),
            state: AtomicU8::new(ConnectionState::Start as u8),
            mode: AtomicU8::new(mode as u8),
            line_count: AtomicU64::new(0),
            use_count: AtomicUsize::new(0),
            queue_size: AtomicUsize::new(0),
            eval_running: AtomicBool::new(false),
            pending_bytes: AtomicUsize::new(0),
            shell_name: RwLock::new(String::new()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn mode(&self) -> ConnectionMode {
        ConnectionMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn set_mode(&self, mode: ConnectionMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    /// Counts one received line and refreshes the activity timestamp.
    pub fn record_line(&self) {
        self.line_count.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn touch(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn line_count(&self) -> u64 {
        self.line_count.load(Ordering::Relaxed)
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        let secs = self.last_activity.load(Ordering::Relaxed);
        Utc.timestamp_opt(secs, 0).single().unwrap_or(self.opened)
    }

    /// Seconds since anything was last received.
    pub fn idle_secs(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() - self.last_activity.load(Ordering::Relaxed)
    }

    /// Registers one more active handler on this connection until the guard drops.
    pub fn acquire_use(self: &Arc<Self>) -> UseGuard {
        self.use_count.fetch_add(1, Ordering::Relaxed);
        UseGuard(Arc::clone(self))
    }

    pub fn use_count(&self) -> usize {
        self.use_count.load(Ordering::Relaxed)
    }

    pub fn set_queue_size(&self, size: usize) {
        self.queue_size.store(size, Ordering::Relaxed);
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size.load(Ordering::Relaxed)
    }

    pub fn set_eval_running(&self, running: bool) {
        self.eval_running.store(running, Ordering::Relaxed);
    }

    pub fn eval_running(&self) -> bool {
        self.eval_running.load(Ordering::Relaxed)
    }

    /// Adds to the pending-output count and returns the new total.
    pub fn add_pending(&self, bytes: usize) -> usize {
        self.pending_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes
    }

    pub fn sub_pending(&self, bytes: usize) {
        let _ = self
            .pending_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes))
            });
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes.load(Ordering::Relaxed)
    }

    pub fn shell_name(&self) -> String {
        self.shell_name.read().clone()
    }

    pub fn set_shell_name(&self, name: &str) {
        *self.shell_name.write() = name.to_string();
    }

    /// Copies the row into a plain value for reporting.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            session_id: self.session_id,
            addr: self.addr,
            opened: self.opened,
            last_activity: self.last_activity(),
            state: self.state(),
            mode: self.mode(),
            line_count: self.line_count(),
            use_count: self.use_count(),
            shell_name: self.shell_name(),
            queue_size: self.queue_size(),
            eval_running: self.eval_running(),
            pending_bytes: self.pending_bytes(),
        }
    }
}

/// Decrements the row's use count when dropped.
#[derive(Debug)]
pub struct UseGuard(Arc<ConnectionRow>);

impl Drop for UseGuard {
    fn drop(&mut self) {
        self.0.use_count.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A point-in-time copy of one connection's row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub session_id: u64,
    pub addr: SocketAddr,
    pub opened: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub state: ConnectionState,
    pub mode: ConnectionMode,
    pub line_count: u64,
    pub use_count: usize,
    pub shell_name: String,
    pub queue_size: usize,
    pub eval_running: bool,
    pub pending_bytes: usize,
}
