// src/core/plugin/registry.rs

//! Maps plugin names from the configuration file to constructors.

use super::ProxyPlugin;
use super::builtin::{BigKeyLog, DenyCommands, DenyKeys};
use crate::core::ProxyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A `[[plugins]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    /// Lower runs first in the `before` phase.
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub settings: toml::Table,
}

fn default_enabled() -> bool {
    true
}

type Constructor = Box<dyn Fn(&toml::Table) -> Result<Arc<dyn ProxyPlugin>, ProxyError> + Send + Sync>;

/// Plugin constructors keyed by name.
pub struct PluginRegistry {
    constructors: HashMap<String, Constructor>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("PluginRegistry").field("plugins", &names).finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry with every plugin that ships with the proxy.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("deny-commands", |settings| {
            Ok(Arc::new(DenyCommands::from_settings(settings)?) as Arc<dyn ProxyPlugin>)
        });
        registry.register("deny-keys", |settings| {
            Ok(Arc::new(DenyKeys::from_settings(settings)?) as Arc<dyn ProxyPlugin>)
        });
        registry.register("big-key-log", |settings| {
            Ok(Arc::new(BigKeyLog::from_settings(settings)?) as Arc<dyn ProxyPlugin>)
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&toml::Table) -> Result<Arc<dyn ProxyPlugin>, ProxyError> + Send + Sync + 'static,
    {
        self.constructors
            .insert(name.to_string(), Box::new(constructor));
    }

    /// Instantiates the enabled entries, sorted by `order`. Entries with equal
    /// order keep their configuration order.
    pub fn build(&self, configs: &[PluginConfig]) -> Result<Vec<Arc<dyn ProxyPlugin>>, ProxyError> {
        let mut enabled: Vec<&PluginConfig> = configs.iter().filter(|c| c.enabled).collect();
        enabled.sort_by_key(|c| c.order);
        enabled
            .into_iter()
            .map(|config| {
                let constructor = self.constructors.get(&config.name).ok_or_else(|| {
                    ProxyError::Config(format!("unknown plugin '{}'", config.name))
                })?;
                constructor(&config.settings).map_err(|e| {
                    ProxyError::Config(format!("plugin '{}': {}", config.name, e))
                })
            })
            .collect()
    }
}
