// src/core/tasks/config_reloader.rs

use crate::config::Config;
use crate::core::state::ProxyState;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Watches the configuration file and installs changed routes, plugins and
/// auth users without a restart.
pub struct ConfigReloaderTask {
    state: Arc<ProxyState>,
    path: String,
    interval: Duration,
    last_modified: Option<SystemTime>,
}

impl ConfigReloaderTask {
    pub fn new(state: Arc<ProxyState>, path: String, interval: Duration) -> Self {
        let last_modified = modified_at(&path);
        Self {
            state,
            path,
            interval,
            last_modified,
        }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Config reloader task started, watching '{}' every {:?}.",
            self.path, self.interval
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_once().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Config reloader task shutting down.");
                    return;
                }
            }
        }
    }

    /// Reloads the file if its modification time changed since the last
    /// check. Returns the installed route table version on a reload.
    pub async fn check_once(&mut self) -> Option<u64> {
        let modified = modified_at(&self.path);
        if modified.is_none() {
            warn!("Config file '{}' is not readable; keeping the current config.", self.path);
            return None;
        }
        if modified == self.last_modified {
            return None;
        }
        self.last_modified = modified;
        debug!("Config file '{}' changed; reloading.", self.path);

        let config = match Config::from_file(&self.path) {
            Ok(config) => config,
            Err(e) => {
                error!("Config reload failed, keeping the current config: {:#}", e);
                return None;
            }
        };
        match self.state.apply_config(config).await {
            Ok(version) => {
                info!("Config reloaded from '{}' (route table version {}).", self.path, version);
                Some(version)
            }
            Err(e) => {
                error!("Config reload rejected, keeping the current config: {}", e);
                None
            }
        }
    }
}

fn modified_at(path: &str) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
