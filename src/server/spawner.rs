// src/server/spawner.rs

//! Spawns all of the proxy's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use crate::core::tasks::{
    config_reloader::ConfigReloaderTask, qps_sampler::QpsSamplerTask,
    template_pruner::TemplatePrunerTask,
};
use anyhow::Result;
use tracing::{info, warn};

/// Spawns all background tasks into the context's JoinSet.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    let config_clone = state.config.lock().await.clone();

    // --- Metrics Server ---
    if config_clone.metrics.enabled {
        let metrics_state = state.clone();
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx_metrics).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // --- Stats ---
    let sampler = QpsSamplerTask::new(state.clone());
    let shutdown_rx_qps = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        sampler.run(shutdown_rx_qps).await;
        Ok(())
    });

    // --- Template Cache ---
    let pruner = TemplatePrunerTask::new(state.templates.clone());
    let shutdown_rx_prune = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        pruner.run(shutdown_rx_prune).await;
        Ok(())
    });

    // --- Hot Reload ---
    if config_clone.reload.enabled {
        match &state.config_path {
            Some(path) => {
                let reloader =
                    ConfigReloaderTask::new(state.clone(), path.clone(), config_clone.reload.interval);
                let shutdown_rx_reload = shutdown_tx.subscribe();
                background_tasks.spawn(async move {
                    reloader.run(shutdown_rx_reload).await;
                    Ok(())
                });
            }
            None => warn!("Config reload is enabled but the proxy was started without a config file."),
        }
    }

    info!("All background tasks have been spawned.");
    Ok(())
}
