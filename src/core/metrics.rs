// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    // --- Server-wide Gauges ---
    /// The number of clients currently connected to the server.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("netshell_connected_clients", "Number of currently connected clients.").unwrap();

    // --- Server-wide Counters ---
    /// The total number of connections admitted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("netshell_connections_received_total", "Total number of connections received.").unwrap();
    /// The total number of lines (or text frames) received from all clients.
    pub static ref LINES_RECEIVED_TOTAL: Counter =
        register_counter!("netshell_lines_received_total", "Total number of input lines received.").unwrap();
    /// Connections that had to wait because every slot was taken.
    pub static ref CONNECTION_STALLS_TOTAL: Counter =
        register_counter!("netshell_connection_stalls_total", "Total number of connections that waited for a free slot.").unwrap();
    /// Connections closed because of a framing or handshake violation, labeled by listener.
    pub static ref PROTOCOL_ERRORS_TOTAL: CounterVec =
        register_counter_vec!("netshell_protocol_errors_total", "Total number of protocol errors, labeled by listener.", &["listener"]).unwrap();
    /// Successful switches from HTTP to WebSocket framing.
    pub static ref WEBSOCKET_UPGRADES_TOTAL: Counter =
        register_counter!("netshell_websocket_upgrades_total", "Total number of completed WebSocket upgrades.").unwrap();
    /// Times a connection's queued output grew past the backlog warning threshold.
    pub static ref OUTPUT_BACKLOG_WARNINGS_TOTAL: Counter =
        register_counter!("netshell_output_backlog_warnings_total", "Total number of connections whose unsent output crossed the backlog threshold.").unwrap();

    // --- Histograms ---
    /// A histogram of line evaluation latencies, commands included.
    pub static ref EVAL_LATENCY_SECONDS: Histogram =
        register_histogram!("netshell_eval_latency_seconds", "Latency of line evaluation in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}\n"))
}
