// src/core/info.rs

//! Renders the proxy's INFO text. Credentials never appear in the output:
//! upstream addresses are always printed in their masked form.

use crate::core::state::ProxyState;
use std::fmt::Write;
use sysinfo::System;

/// The sections `INFO` understands, in rendering order.
pub const SECTIONS: &[&str] = &["server", "clients", "route", "upstream", "stats"];

/// Builds the INFO text for `section`, or for every section when it is
/// `None` or `all`. Unknown sections render as an empty string.
pub async fn render(state: &ProxyState, section: Option<&str>) -> String {
    let section = section.map(str::to_ascii_lowercase);
    let wants = |name: &str| matches!(section.as_deref(), None | Some("all")) || section.as_deref() == Some(name);

    let mut info = String::new();
    if wants("server") {
        let port = state.config.lock().await.port;
        render_server(state, port, &mut info);
    }
    if wants("clients") {
        render_clients(state, &mut info);
    }
    if wants("route") {
        render_route(state, &mut info);
    }
    if wants("upstream") {
        render_upstream(state, &mut info);
    }
    if wants("stats") {
        render_stats(state, &mut info);
    }
    info
}

fn render_server(state: &ProxyState, port: u16, info: &mut String) {
    info.push_str("# Server\r\n");
    let _ = write!(info, "spinelproxy_version:{}\r\n", env!("CARGO_PKG_VERSION"));
    let _ = write!(info, "run_id:{}\r\n", state.run_id);
    let _ = write!(info, "os:{}\r\n", System::long_os_version().unwrap_or_default());
    let _ = write!(
        info,
        "available_processors:{}\r\n",
        std::thread::available_parallelism().map_or(1, |n| n.get())
    );
    let _ = write!(info, "tcp_port:{port}\r\n");
    let uptime = state.started_at.elapsed().as_secs();
    let _ = write!(info, "uptime_in_seconds:{uptime}\r\n");
    let _ = write!(info, "uptime_in_days:{}\r\n", uptime / 86_400);
    info.push_str("\r\n");
}

fn render_clients(state: &ProxyState, info: &mut String) {
    info.push_str("# Clients\r\n");
    let _ = write!(info, "connected_clients:{}\r\n", state.clients.len());
    for (label, count) in state.clients.tenant_counts() {
        let _ = write!(info, "connect_clients_{label}:{count}\r\n");
    }
    info.push_str("\r\n");
}

fn render_route(state: &ProxyState, info: &mut String) {
    info.push_str("# Route\r\n");
    let table = state.routes.snapshot();
    let _ = write!(info, "route_table_version:{}\r\n", table.version());
    let _ = write!(info, "route_count:{}\r\n", table.len());
    let _ = write!(info, "upstream_template_count:{}\r\n", state.templates.template_count());

    let mut routes: Vec<_> = table.iter().collect();
    routes.sort_by_key(|(tenant, _)| tenant.label());
    for (tenant, resource) in routes {
        let json = serde_json::to_string(resource.as_ref()).unwrap_or_else(|e| format!("\"{e}\""));
        let _ = write!(info, "route_{}:{}\r\n", tenant.label(), json);
    }
    info.push_str("\r\n");
}

fn render_upstream(state: &ProxyState, info: &mut String) {
    info.push_str("# Upstream\r\n");
    let mut links = state.templates.pool().link_counts();
    links.sort_by_key(|(addr, _)| addr.masked());
    let _ = write!(info, "upstream_addr_count:{}\r\n", links.len());
    for (addr, count) in links {
        let _ = write!(info, "upstream_{}:links={}\r\n", addr.masked(), count);
    }
    info.push_str("\r\n");
}

fn render_stats(state: &ProxyState, info: &mut String) {
    info.push_str("# Stats\r\n");
    let stats = &state.stats;
    let _ = write!(info, "total_connections_received:{}\r\n", stats.get_total_connections());
    let _ = write!(info, "total_commands_processed:{}\r\n", stats.total_commands());
    let _ = write!(info, "read_commands:{}\r\n", stats.read_commands());
    let _ = write!(info, "write_commands:{}\r\n", stats.write_commands());
    let _ = write!(info, "avg_commands_qps:{:.2}\r\n", stats.avg_qps());
    let _ = write!(info, "last_commands_qps:{}\r\n", stats.last_second_qps());
    info.push_str("\r\n");
}
