// src/config.rs

//! Manages proxy configuration: loading, resolving defaults, and validation.

use crate::core::auth::{AuthUser, ConfigAuthProvider};
use crate::core::plugin::PluginConfig;
use crate::core::routing::{NodeSet, Resource, StaticTopology, TenantKey, UpstreamAddr};
use crate::core::upstream::PoolConfig;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9380
}

/// Configuration for TLS encryption of client connections.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cert_path")]
    pub cert_path: String,
    #[serde(default = "default_key_path")]
    pub key_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

fn default_cert_path() -> String {
    "spinelproxy.crt".to_string()
}
fn default_key_path() -> String {
    "spinelproxy.key".to_string()
}

/// Client authentication settings.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AuthConfig {
    /// Defaults to true when any credential is configured.
    #[serde(default)]
    pub required: Option<bool>,
    /// A single password bound to the default tenant.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, skip_serializing)]
    pub users: Vec<AuthUser>,
}

impl AuthConfig {
    pub fn is_required(&self) -> bool {
        self.required
            .unwrap_or(self.password.is_some() || !self.users.is_empty())
    }

    pub fn provider(&self) -> ConfigAuthProvider {
        ConfigAuthProvider::new(self.is_required(), self.password.clone(), self.users.clone())
    }
}

/// Settings for the shared upstream connection pool.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_connections_per_addr")]
    pub connections_per_addr: usize,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(default = "default_max_pending_per_link")]
    pub max_pending_per_link: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connections_per_addr: default_connections_per_addr(),
            connect_timeout: default_connect_timeout(),
            max_pending_per_link: default_max_pending_per_link(),
        }
    }
}

impl UpstreamConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            connections_per_addr: self.connections_per_addr,
            connect_timeout: self.connect_timeout,
            max_pending_per_link: self.max_pending_per_link,
        }
    }
}

fn default_connections_per_addr() -> usize {
    1
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}
fn default_max_pending_per_link() -> usize {
    100_000
}

/// A `[[routes]]` entry: one tenant and the resource it is routed to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RouteConfig {
    #[serde(default)]
    pub tenant_id: Option<i64>,
    #[serde(default)]
    pub tenant_group: Option<String>,
    pub resource: Resource,
}

impl RouteConfig {
    pub fn tenant(&self) -> TenantKey {
        TenantKey::new(self.tenant_id, self.tenant_group.clone())
    }
}

/// A `[[sentinel_masters]]` entry: the nodes behind a sentinel master name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SentinelMasterConfig {
    pub name: String,
    pub primary: UpstreamAddr,
    #[serde(default)]
    pub replicas: Vec<UpstreamAddr>,
}

/// Hot reload of routes, plugins and auth users.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReloadConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_reload_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_reload_interval(),
        }
    }
}

fn default_reload_interval() -> Duration {
    Duration::from_secs(10)
}

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default = "default_max_pending_per_connection")]
    max_pending_per_connection: usize,
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    command_timeout: Duration,
    #[serde(default)]
    auth: AuthConfig,
    #[serde(default)]
    upstream: UpstreamConfig,
    #[serde(default)]
    routes: Vec<RouteConfig>,
    #[serde(default)]
    sentinel_masters: Vec<SentinelMasterConfig>,
    #[serde(default)]
    plugins: Vec<PluginConfig>,
    #[serde(default)]
    tls: TlsConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    reload: ReloadConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6380
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}
fn default_max_pending_per_connection() -> usize {
    10000
}
fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Represents the final, validated proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_clients: usize,
    pub max_pending_per_connection: usize,
    /// Zero disables the per-command timeout.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub sentinel_masters: Vec<SentinelMasterConfig>,
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub reload: ReloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            max_pending_per_connection: default_max_pending_per_connection(),
            command_timeout: default_command_timeout(),
            auth: AuthConfig::default(),
            upstream: UpstreamConfig::default(),
            routes: Vec::new(),
            sentinel_masters: Vec::new(),
            plugins: Vec::new(),
            tls: TlsConfig::default(),
            metrics: MetricsConfig::default(),
            reload: ReloadConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Parses and validates a TOML document.
    pub fn parse(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML")?;

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            log_level: raw_config.log_level,
            max_clients: raw_config.max_clients,
            max_pending_per_connection: raw_config.max_pending_per_connection,
            command_timeout: raw_config.command_timeout,
            auth: raw_config.auth,
            upstream: raw_config.upstream,
            routes: raw_config.routes,
            sentinel_masters: raw_config.sentinel_masters,
            plugins: raw_config.plugins,
            tls: raw_config.tls,
            metrics: raw_config.metrics,
            reload: raw_config.reload,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.max_pending_per_connection == 0 {
            return Err(anyhow!("max_pending_per_connection cannot be 0"));
        }
        if self.upstream.connections_per_addr == 0 {
            return Err(anyhow!("upstream.connections_per_addr cannot be 0"));
        }
        if self.upstream.max_pending_per_link == 0 {
            return Err(anyhow!("upstream.max_pending_per_link cannot be 0"));
        }
        if self.command_timeout.is_zero() {
            warn!("command_timeout is 0: commands will wait on upstreams indefinitely.");
        }

        let mut seen = HashSet::new();
        for (i, route) in self.routes.iter().enumerate() {
            if route.tenant_group.is_some() && route.tenant_id.is_none() {
                return Err(anyhow!(
                    "route #{}: tenant_group requires tenant_id",
                    i + 1
                ));
            }
            let tenant = route.tenant();
            route
                .resource
                .validate()
                .map_err(|e| anyhow!("route #{} for tenant {}: {}", i + 1, tenant, e))?;
            if !seen.insert(tenant.clone()) {
                return Err(anyhow!("duplicate route for tenant {}", tenant));
            }
        }
        if self.routes.is_empty() {
            warn!("No routes configured: every command will get a no-route error.");
        }

        let masters: HashSet<&str> = self.sentinel_masters.iter().map(|m| m.name.as_str()).collect();
        for route in &self.routes {
            if let Resource::Sentinel { master_name, .. } = &route.resource
                && !masters.contains(master_name.as_str())
            {
                warn!(
                    "Route for tenant {} uses sentinel master '{}' which has no [[sentinel_masters]] entry.",
                    route.tenant(),
                    master_name
                );
            }
        }

        if self.auth.users.iter().any(|u| u.tenant_group.is_some() && u.tenant_id.is_none()) {
            return Err(anyhow!("auth user tenant_group requires tenant_id"));
        }
        if self.auth.required == Some(true) && self.auth.password.is_none() && self.auth.users.is_empty() {
            return Err(anyhow!("auth.required is set but no password or users are configured"));
        }

        if self.tls.enabled {
            if self.tls.cert_path.trim().is_empty() {
                return Err(anyhow!("tls.cert_path cannot be empty when TLS is enabled"));
            }
            if self.tls.key_path.trim().is_empty() {
                return Err(anyhow!("tls.key_path cannot be empty when TLS is enabled"));
            }
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }

        if self.reload.enabled && self.reload.interval.is_zero() {
            return Err(anyhow!("reload.interval cannot be 0"));
        }
        Ok(())
    }

    /// The routes as a map ready to be installed in a route table.
    pub fn route_map(&self) -> HashMap<TenantKey, Resource> {
        self.routes
            .iter()
            .map(|r| (r.tenant(), r.resource.clone()))
            .collect()
    }

    /// The static topology resolver for sentinel routes.
    pub fn topology(&self) -> StaticTopology {
        StaticTopology::new(
            self.sentinel_masters
                .iter()
                .map(|m| {
                    (
                        m.name.clone(),
                        NodeSet {
                            primary: m.primary.clone(),
                            replicas: m.replicas.clone(),
                        },
                    )
                })
                .collect(),
        )
    }
}
