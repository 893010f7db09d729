// src/core/routing/table.rs

//! Defines the versioned `RouteTable` snapshot and the store that swaps it.

use super::resource::Resource;
use super::tenant::TenantKey;
use crate::core::ProxyError;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// An immutable mapping from tenant to resource, tagged with its version.
#[derive(Debug, Default)]
pub struct RouteTable {
    version: u64,
    routes: HashMap<TenantKey, Arc<Resource>>,
}

impl RouteTable {
    /// Builds a table, validating every resource in it.
    pub fn new(version: u64, routes: HashMap<TenantKey, Resource>) -> Result<Self, ProxyError> {
        for (tenant, resource) in &routes {
            resource.validate().map_err(|e| {
                ProxyError::InvalidRoute(format!("tenant {tenant}: {e}"))
            })?;
        }
        Ok(Self {
            version,
            routes: routes.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TenantKey, &Arc<Resource>)> {
        self.routes.iter()
    }

    pub fn get(&self, tenant: &TenantKey) -> Option<&Arc<Resource>> {
        self.routes.get(tenant)
    }
}

/// Resolves a tenant against one table snapshot: the exact entry, else the
/// default domain's entry, else `NoRoute`.
pub fn resolve(table: &RouteTable, tenant: &TenantKey) -> Result<Arc<Resource>, ProxyError> {
    table
        .get(tenant)
        .or_else(|| table.get(&TenantKey::default_domain()))
        .cloned()
        .ok_or_else(|| ProxyError::NoRoute(tenant.to_string()))
}

/// Holds the current `RouteTable`. Readers load the snapshot without locking;
/// writers are serialized and must advance the version.
pub struct RouteTableStore {
    current: ArcSwap<RouteTable>,
    install_lock: Mutex<()>,
    version_tx: watch::Sender<u64>,
}

impl std::fmt::Debug for RouteTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTableStore")
            .field("version", &self.version())
            .finish()
    }
}

impl Default for RouteTableStore {
    fn default() -> Self {
        Self::new(RouteTable::default())
    }
}

impl RouteTableStore {
    pub fn new(initial: RouteTable) -> Self {
        let (version_tx, _) = watch::channel(initial.version);
        Self {
            current: ArcSwap::from_pointee(initial),
            install_lock: Mutex::new(()),
            version_tx,
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// Installs `routes` as version `version`. The version must be greater than
    /// the installed one; stale installs are rejected and leave the table as is.
    pub fn install(
        &self,
        version: u64,
        routes: HashMap<TenantKey, Resource>,
    ) -> Result<Arc<RouteTable>, ProxyError> {
        let _guard = self.install_lock.lock();
        let current = self.current.load().version;
        if version <= current {
            return Err(ProxyError::Config(format!(
                "route table version {version} is not newer than installed version {current}"
            )));
        }
        Ok(self.swap_in(RouteTable::new(version, routes)?))
    }

    /// Installs `routes` as the next version after the current one.
    pub fn install_next(
        &self,
        routes: HashMap<TenantKey, Resource>,
    ) -> Result<Arc<RouteTable>, ProxyError> {
        let _guard = self.install_lock.lock();
        let version = self.current.load().version + 1;
        Ok(self.swap_in(RouteTable::new(version, routes)?))
    }

    fn swap_in(&self, table: RouteTable) -> Arc<RouteTable> {
        let table = Arc::new(table);
        self.current.store(table.clone());
        info!(
            "Installed route table version {} with {} route(s).",
            table.version,
            table.len()
        );
        self.version_tx.send_replace(table.version);
        table
    }

    /// A receiver notified with the new version after every install.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }
}
