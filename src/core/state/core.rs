// src/core/state/core.rs

//! Defines the central `ProxyState` struct, holding all shared proxy-wide state.

use super::client::ClientRegistry;
use super::stats::ProxyStats;
use crate::config::Config;
use crate::core::ProxyError;
use crate::core::auth::AuthGate;
use crate::core::metrics;
use crate::core::plugin::{PluginChain, PluginHandle, PluginRegistry};
use crate::core::routing::{RouteTable, RouteTableStore};
use crate::core::upstream::{RedisConnectionPool, TemplateFactory, UpstreamPool};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

pub type LogReloadHandle = Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>;

/// The central struct holding all shared, proxy-wide state.
///
/// Routes, plugins and the auth provider are each held as swappable
/// snapshots, so readers never block and never see a half-applied update.
#[derive(Debug)]
pub struct ProxyState {
    /// The configuration the proxy is currently running with.
    pub config: Arc<Mutex<Config>>,
    /// Where the configuration was loaded from, for hot reload.
    pub config_path: Option<String>,
    pub routes: Arc<RouteTableStore>,
    pub templates: Arc<TemplateFactory>,
    pub plugins: PluginHandle,
    pub plugin_registry: PluginRegistry,
    pub auth: AuthGate,
    pub clients: ClientRegistry,
    pub stats: ProxyStats,
    /// A handle to the logging filter, so a reload can change the log level.
    pub log_reload_handle: Option<LogReloadHandle>,
    /// Deadline for one command's upstream round trip. Zero disables it.
    pub command_timeout: Duration,
    pub max_pending_per_connection: usize,
    pub run_id: String,
    pub started_at: Instant,
    next_client_id: AtomicU64,
}

impl ProxyState {
    /// Initializes the proxy state with the production connection pool.
    pub fn initialize(
        config: Config,
        config_path: Option<String>,
        log_reload_handle: Option<LogReloadHandle>,
    ) -> Result<Arc<Self>, ProxyError> {
        let pool = Arc::new(RedisConnectionPool::new(config.upstream.pool_config()));
        Self::with_pool(config, config_path, log_reload_handle, pool)
    }

    /// Initializes the proxy state on top of an arbitrary upstream pool.
    pub fn with_pool(
        config: Config,
        config_path: Option<String>,
        log_reload_handle: Option<LogReloadHandle>,
        pool: Arc<dyn UpstreamPool>,
    ) -> Result<Arc<Self>, ProxyError> {
        let routes = Arc::new(RouteTableStore::new(RouteTable::new(1, config.route_map())?));
        let templates = Arc::new(
            TemplateFactory::new(routes.clone(), pool).with_resolver(Arc::new(config.topology())),
        );

        let plugin_registry = PluginRegistry::with_builtins();
        let plugins = PluginHandle::new(PluginChain::new(1, plugin_registry.build(&config.plugins)?));
        let auth = AuthGate::new(Arc::new(config.auth.provider()));

        metrics::ROUTE_TABLE_VERSION.set(routes.version() as f64);
        info!(
            "Proxy state initialized with {} routes and {} plugins.",
            routes.snapshot().len(),
            plugins.snapshot().len()
        );

        Ok(Arc::new(Self {
            command_timeout: config.command_timeout,
            max_pending_per_connection: config.max_pending_per_connection,
            config: Arc::new(Mutex::new(config)),
            config_path,
            routes,
            templates,
            plugins,
            plugin_registry,
            auth,
            clients: ClientRegistry::new(),
            stats: ProxyStats::new(),
            log_reload_handle,
            run_id: uuid::Uuid::new_v4().simple().to_string(),
            started_at: Instant::now(),
            next_client_id: AtomicU64::new(1),
        }))
    }

    /// Hands out a unique, increasing connection id.
    pub fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Installs the routes, plugins, auth users and log level of `new_config`
    /// as new snapshots. Nothing is installed if any part fails to build.
    pub async fn apply_config(&self, new_config: Config) -> Result<u64, ProxyError> {
        let plugins = self.plugin_registry.build(&new_config.plugins)?;
        // Validate the routes before touching anything live.
        RouteTable::new(0, new_config.route_map())?;

        if let Some(handle) = &self.log_reload_handle {
            let filter = EnvFilter::try_new(&new_config.log_level)
                .map_err(|e| ProxyError::Config(format!("invalid log_level: {e}")))?;
            handle
                .reload(filter)
                .map_err(|e| ProxyError::Internal(e.to_string()))?;
        }

        self.templates.set_resolver(Arc::new(new_config.topology()));
        let table = self.routes.install_next(new_config.route_map())?;
        self.plugins.install(plugins);
        self.auth.set_provider(Arc::new(new_config.auth.provider()));
        metrics::ROUTE_TABLE_VERSION.set(table.version() as f64);

        *self.config.lock().await = new_config;
        Ok(table.version())
    }
}
