// src/core/tasks/template_pruner.rs

use crate::core::upstream::TemplateFactory;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

/// Drops cached templates made stale by a route table install, so retired
/// tenants release their templates without waiting for traffic.
pub struct TemplatePrunerTask {
    factory: Arc<TemplateFactory>,
    versions: watch::Receiver<u64>,
}

impl TemplatePrunerTask {
    pub fn new(factory: Arc<TemplateFactory>) -> Self {
        let versions = factory.routes().subscribe();
        Self { factory, versions }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Template pruner task started.");
        loop {
            tokio::select! {
                changed = self.versions.changed() => {
                    if changed.is_err() {
                        info!("Route table store dropped; template pruner exiting.");
                        return;
                    }
                    let version = *self.versions.borrow_and_update();
                    let removed = self.factory.prune();
                    debug!("Route table version {} installed; pruned {} templates.", version, removed);
                }
                _ = shutdown_rx.recv() => {
                    info!("Template pruner task shutting down.");
                    return;
                }
            }
        }
    }
}
