// src/core/tasks/qps_sampler.rs

use crate::core::metrics;
use crate::core::state::ProxyState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// How often the last-second QPS figure is recomputed.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Samples command counters once a second for the INFO stats section.
pub struct QpsSamplerTask {
    state: Arc<ProxyState>,
}

impl QpsSamplerTask {
    pub fn new(state: Arc<ProxyState>) -> Self {
        Self { state }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("QPS sampler task started.");
        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.state.stats.sample_qps();
                    metrics::UPSTREAM_TEMPLATES.set(self.state.templates.template_count() as f64);
                }
                _ = shutdown_rx.recv() => {
                    info!("QPS sampler task shutting down.");
                    return;
                }
            }
        }
    }
}
