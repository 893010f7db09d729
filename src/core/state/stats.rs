// src/core/state/stats.rs

//! Contains state definitions and logic for proxy statistics.

use crate::core::commands::CommandKind;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Holds all proxy-wide counters and the sampled QPS figures.
#[derive(Debug)]
pub struct ProxyStats {
    started_at: Instant,
    total_connections: AtomicU64,
    read_commands: AtomicU64,
    write_commands: AtomicU64,
    other_commands: AtomicU64,
    /// Commands completed during the last full sampling second.
    last_second_qps: AtomicU64,
    /// The command total and time of the previous sample.
    last_sample: Mutex<(Instant, u64)>,
}

impl Default for ProxyStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            total_connections: AtomicU64::new(0),
            read_commands: AtomicU64::new(0),
            write_commands: AtomicU64::new(0),
            other_commands: AtomicU64::new(0),
            last_second_qps: AtomicU64::new(0),
            last_sample: Mutex::new((now, 0)),
        }
    }

    pub fn increment_total_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Counts one dispatched command.
    pub fn record_command(&self, kind: CommandKind) {
        let counter = match kind {
            CommandKind::Read => &self.read_commands,
            CommandKind::Write => &self.write_commands,
            CommandKind::Unknown => &self.other_commands,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read_commands(&self) -> u64 {
        self.read_commands.load(Ordering::Relaxed)
    }

    pub fn write_commands(&self) -> u64 {
        self.write_commands.load(Ordering::Relaxed)
    }

    pub fn total_commands(&self) -> u64 {
        self.read_commands() + self.write_commands() + self.other_commands.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Average commands per second since startup.
    pub fn avg_qps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.total_commands() as f64 / elapsed
    }

    pub fn last_second_qps(&self) -> u64 {
        self.last_second_qps.load(Ordering::Relaxed)
    }

    /// Recomputes the last-second QPS from the commands counted since the
    /// previous call. Called once per second by the sampler task.
    pub fn sample_qps(&self) {
        let total = self.total_commands();
        let mut last = self.last_sample.lock();
        let elapsed = last.0.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let qps = (total.saturating_sub(last.1) as f64 / elapsed).round() as u64;
            self.last_second_qps.store(qps, Ordering::Relaxed);
        }
        *last = (Instant::now(), total);
    }
}
