// src/core/plugin/builtin.rs

//! Plugins that ship with the proxy.

use super::{PluginAction, PluginContext, ProxyPlugin};
use crate::core::ProxyError;
use crate::core::protocol::{Command, RespFrame};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use tracing::warn;
use wildmatch::WildMatch;

fn parse_settings<T: DeserializeOwned>(settings: &toml::Table) -> Result<T, ProxyError> {
    toml::Value::Table(settings.clone())
        .try_into()
        .map_err(|e: toml::de::Error| ProxyError::Config(e.to_string()))
}

/// Refuses the listed commands before they are dispatched.
#[derive(Debug)]
pub struct DenyCommands {
    commands: HashSet<String>,
}

#[derive(Deserialize)]
struct DenyCommandsSettings {
    commands: Vec<String>,
}

impl DenyCommands {
    pub fn new<I: IntoIterator<Item = S>, S: AsRef<str>>(commands: I) -> Self {
        Self {
            commands: commands
                .into_iter()
                .map(|c| c.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_settings(settings: &toml::Table) -> Result<Self, ProxyError> {
        let parsed: DenyCommandsSettings = parse_settings(settings)?;
        Ok(Self::new(parsed.commands))
    }
}

impl ProxyPlugin for DenyCommands {
    fn name(&self) -> &str {
        "deny-commands"
    }

    fn before(&self, _ctx: &PluginContext, command: &Command) -> Result<PluginAction, ProxyError> {
        if self.commands.contains(command.name()) {
            return Ok(PluginAction::Reply(
                ProxyError::CommandDenied(command.name().to_string()).into(),
            ));
        }
        Ok(PluginAction::Continue)
    }
}

/// Refuses commands touching keys that match any of the glob patterns.
#[derive(Debug)]
pub struct DenyKeys {
    patterns: Vec<WildMatch>,
}

#[derive(Deserialize)]
struct DenyKeysSettings {
    patterns: Vec<String>,
}

impl DenyKeys {
    pub fn new<I: IntoIterator<Item = S>, S: AsRef<str>>(patterns: I) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| WildMatch::new(p.as_ref()))
                .collect(),
        }
    }

    pub fn from_settings(settings: &toml::Table) -> Result<Self, ProxyError> {
        let parsed: DenyKeysSettings = parse_settings(settings)?;
        Ok(Self::new(parsed.patterns))
    }
}

impl ProxyPlugin for DenyKeys {
    fn name(&self) -> &str {
        "deny-keys"
    }

    fn before(&self, _ctx: &PluginContext, command: &Command) -> Result<PluginAction, ProxyError> {
        for key in command.keys() {
            let key = String::from_utf8_lossy(&key);
            if self.patterns.iter().any(|p| p.matches(&key)) {
                return Ok(PluginAction::Reply(
                    ProxyError::CommandDenied(format!("key '{key}' is not allowed")).into(),
                ));
            }
        }
        Ok(PluginAction::Continue)
    }
}

/// Logs replies whose payload is larger than a threshold.
#[derive(Debug)]
pub struct BigKeyLog {
    threshold_bytes: usize,
}

#[derive(Deserialize)]
struct BigKeyLogSettings {
    #[serde(default = "default_threshold")]
    threshold_bytes: usize,
}

fn default_threshold() -> usize {
    1024 * 1024
}

impl BigKeyLog {
    pub fn new(threshold_bytes: usize) -> Self {
        Self { threshold_bytes }
    }

    pub fn from_settings(settings: &toml::Table) -> Result<Self, ProxyError> {
        let parsed: BigKeyLogSettings = parse_settings(settings)?;
        Ok(Self::new(parsed.threshold_bytes))
    }
}

impl ProxyPlugin for BigKeyLog {
    fn name(&self) -> &str {
        "big-key-log"
    }

    fn after(
        &self,
        ctx: &PluginContext,
        command: &Command,
        reply: &mut RespFrame,
    ) -> Result<(), ProxyError> {
        let size = reply.payload_len();
        if size > self.threshold_bytes {
            let key = command
                .keys()
                .first()
                .map(|k| String::from_utf8_lossy(k).into_owned())
                .unwrap_or_default();
            warn!(
                "Big reply of {} bytes for '{}' key '{}' (client {}, tenant {})",
                size,
                command.name(),
                key,
                ctx.client_id,
                ctx.tenant
            );
        }
        Ok(())
    }
}
