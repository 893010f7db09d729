// src/core/upstream/factory.rs

//! Defines `TemplateFactory`, the process-wide cache of per-tenant templates.

use super::pool::UpstreamPool;
use super::template::UpstreamTemplate;
use crate::core::routing::{RouteTableStore, StaticTopology, TenantKey, TopologyResolver, resolve};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Hands out one template per tenant, rebuilding it whenever the route table
/// has moved past the version the cached template was built from.
pub struct TemplateFactory {
    routes: Arc<RouteTableStore>,
    pool: Arc<dyn UpstreamPool>,
    resolver: RwLock<Arc<dyn TopologyResolver>>,
    registry: DashMap<TenantKey, Arc<UpstreamTemplate>>,
}

impl std::fmt::Debug for TemplateFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateFactory")
            .field("route_version", &self.routes.version())
            .field("templates", &self.registry.len())
            .finish()
    }
}

impl TemplateFactory {
    pub fn new(routes: Arc<RouteTableStore>, pool: Arc<dyn UpstreamPool>) -> Self {
        Self {
            routes,
            pool,
            resolver: RwLock::new(Arc::new(StaticTopology::default())),
            registry: DashMap::new(),
        }
    }

    pub fn with_resolver(self, resolver: Arc<dyn TopologyResolver>) -> Self {
        *self.resolver.write() = resolver;
        self
    }

    /// Replaces the topology resolver. Cached templates keep their resolved
    /// nodes until the next route install makes them stale.
    pub fn set_resolver(&self, resolver: Arc<dyn TopologyResolver>) {
        *self.resolver.write() = resolver;
    }

    pub fn routes(&self) -> &Arc<RouteTableStore> {
        &self.routes
    }

    pub fn pool(&self) -> &Arc<dyn UpstreamPool> {
        &self.pool
    }

    /// Returns the template for `tenant`, building it against the current
    /// route table if there is none cached or the cached one is stale.
    ///
    /// Concurrent callers for the same tenant observe a single template per
    /// version: the build runs under the registry entry lock.
    pub fn get_template(&self, tenant: &TenantKey) -> Arc<UpstreamTemplate> {
        let table = self.routes.snapshot();

        if let Some(cached) = self.registry.get(tenant)
            && cached.version() >= table.version()
        {
            return cached.clone();
        }

        let build = || {
            debug!(
                "Building upstream template for tenant {} at route version {}",
                tenant,
                table.version()
            );
            let resolver = self.resolver.read().clone();
            Arc::new(UpstreamTemplate::new(
                tenant.clone(),
                &table,
                self.pool.clone(),
                resolver.as_ref(),
            ))
        };

        match self.registry.entry(tenant.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().version() < table.version() {
                    entry.insert(build());
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(build()).clone(),
        }
    }

    /// Drops cached templates that were built from an older route table. The
    /// ones whose tenant no longer resolves at all are counted in the log.
    pub fn prune(&self) -> usize {
        let table = self.routes.snapshot();
        let before = self.registry.len();
        let mut orphaned = 0usize;
        self.registry.retain(|tenant, template| {
            if template.version() >= table.version() {
                return true;
            }
            if resolve(&table, tenant).is_err() {
                orphaned += 1;
            }
            false
        });
        let removed = before.saturating_sub(self.registry.len());
        if removed > 0 {
            info!(
                "Pruned {} stale upstream templates ({} without a route) at version {}",
                removed,
                orphaned,
                table.version()
            );
        }
        removed
    }

    pub fn template_count(&self) -> usize {
        self.registry.len()
    }

    /// A snapshot of every cached template, for INFO.
    pub fn templates(&self) -> Vec<Arc<UpstreamTemplate>> {
        self.registry.iter().map(|e| e.value().clone()).collect()
    }
}
