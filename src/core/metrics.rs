// src/core/metrics.rs

//! Defines and registers Prometheus metrics for proxy monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// The number of clients currently connected to the proxy.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("spinelproxy_connected_clients", "Number of currently connected clients.").unwrap();
    /// The version of the route table currently installed.
    pub static ref ROUTE_TABLE_VERSION: Gauge =
        register_gauge!("spinelproxy_route_table_version", "Version of the installed route table.").unwrap();
    /// The number of cached upstream templates.
    pub static ref UPSTREAM_TEMPLATES: Gauge =
        register_gauge!("spinelproxy_upstream_templates", "Number of cached per-tenant upstream templates.").unwrap();

    // --- Counters ---
    /// The total number of commands processed, labeled by read/write/unknown kind.
    pub static ref COMMANDS_PROCESSED_TOTAL: CounterVec =
        register_counter_vec!("spinelproxy_commands_processed_total", "Total number of commands processed, labeled by kind.", &["kind"]).unwrap();
    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("spinelproxy_connections_received_total", "Total number of connections received.").unwrap();
    /// The total number of upstream link failures.
    pub static ref UPSTREAM_ERRORS_TOTAL: Counter =
        register_counter!("spinelproxy_upstream_errors_total", "Total number of upstream connection failures.").unwrap();
    /// The total number of commands that timed out waiting on an upstream.
    pub static ref UPSTREAM_TIMEOUTS_TOTAL: Counter =
        register_counter!("spinelproxy_upstream_timeouts_total", "Total number of commands that timed out upstream.").unwrap();
    /// The total number of plugin hook failures, labeled by plugin name.
    pub static ref PLUGIN_FAILURES_TOTAL: CounterVec =
        register_counter_vec!("spinelproxy_plugin_failures_total", "Total number of plugin hook failures, labeled by plugin.", &["plugin"]).unwrap();
    /// The total number of commands rejected by the auth gate.
    pub static ref AUTH_REJECTIONS_TOTAL: Counter =
        register_counter!("spinelproxy_auth_rejections_total", "Total number of commands rejected by the auth gate.").unwrap();

    // --- Histograms ---
    /// A histogram of end-to-end command latencies.
    pub static ref COMMAND_LATENCY_SECONDS: Histogram =
        register_histogram!("spinelproxy_command_latency_seconds", "Latency of command processing in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
