// src/core/plugin/chain.rs

use super::{PluginAction, PluginContext, ProxyPlugin};
use crate::core::metrics;
use crate::core::protocol::{Command, RespFrame};
use arc_swap::ArcSwap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{info, warn};

/// The result of the `before` phase.
#[derive(Debug)]
pub struct BeforeOutcome {
    /// The command to dispatch, possibly rewritten by a plugin.
    pub command: Command,
    /// A reply that short-circuits dispatch.
    pub reply: Option<RespFrame>,
}

/// An immutable, ordered list of plugins.
#[derive(Default)]
pub struct PluginChain {
    version: u64,
    plugins: Vec<Arc<dyn ProxyPlugin>>,
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChain")
            .field("version", &self.version)
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginChain {
    pub fn new(version: u64, plugins: Vec<Arc<dyn ProxyPlugin>>) -> Self {
        Self { version, plugins }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Runs `before` hooks in order until one answers.
    pub fn before(&self, ctx: &PluginContext, command: Command) -> BeforeOutcome {
        let mut command = command;
        for plugin in &self.plugins {
            let result = catch_unwind(AssertUnwindSafe(|| plugin.before(ctx, &command)));
            match result {
                Ok(Ok(PluginAction::Continue)) => {}
                Ok(Ok(PluginAction::Rewrite(rewritten))) => command = rewritten,
                Ok(Ok(PluginAction::Reply(reply))) => {
                    return BeforeOutcome {
                        command,
                        reply: Some(reply),
                    };
                }
                Ok(Err(e)) => record_failure(plugin.name(), "before", &e.to_string()),
                Err(_) => record_failure(plugin.name(), "before", "panicked"),
            }
        }
        BeforeOutcome {
            command,
            reply: None,
        }
    }

    /// Runs every `after` hook in reverse order over `reply`.
    pub fn after(&self, ctx: &PluginContext, command: &Command, mut reply: RespFrame) -> RespFrame {
        for plugin in self.plugins.iter().rev() {
            // A failing hook must not leave a half-edited reply behind.
            let mut candidate = reply.clone();
            let result = catch_unwind(AssertUnwindSafe(|| {
                plugin.after(ctx, command, &mut candidate)
            }));
            match result {
                Ok(Ok(())) => reply = candidate,
                Ok(Err(e)) => record_failure(plugin.name(), "after", &e.to_string()),
                Err(_) => record_failure(plugin.name(), "after", "panicked"),
            }
        }
        reply
    }
}

fn record_failure(plugin: &str, hook: &str, reason: &str) {
    warn!("Plugin '{}' {} hook failed, skipping it: {}", plugin, hook, reason);
    metrics::PLUGIN_FAILURES_TOTAL
        .with_label_values(&[plugin])
        .inc();
}

/// The process-wide slot holding the active chain. Installing a chain swaps
/// the snapshot; commands that already captured the old one keep using it.
#[derive(Debug, Default)]
pub struct PluginHandle {
    current: ArcSwap<PluginChain>,
}

impl PluginHandle {
    pub fn new(chain: PluginChain) -> Self {
        Self {
            current: ArcSwap::from_pointee(chain),
        }
    }

    pub fn snapshot(&self) -> Arc<PluginChain> {
        self.current.load_full()
    }

    /// Installs `plugins` as the next chain version.
    pub fn install(&self, plugins: Vec<Arc<dyn ProxyPlugin>>) -> Arc<PluginChain> {
        let version = self.current.load().version() + 1;
        let chain = Arc::new(PluginChain::new(version, plugins));
        info!(
            "Installed plugin chain version {} with plugins {:?}",
            version,
            chain.names()
        );
        self.current.store(chain.clone());
        chain
    }
}
