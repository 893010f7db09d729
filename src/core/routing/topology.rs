// src/core/routing/topology.rs

//! The seam to cluster-membership discovery. Sentinel-managed resources name a
//! master group; a `TopologyResolver` turns that name into concrete nodes.

use super::resource::NodeSet;
use crate::core::ProxyError;
use std::collections::HashMap;

/// Resolves a sentinel master group to its current primary and replicas.
pub trait TopologyResolver: Send + Sync {
    fn resolve_master(&self, master_name: &str, sentinels: &[String]) -> Result<NodeSet, ProxyError>;
}

/// A resolver backed by a fixed map, loaded from configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticTopology {
    masters: HashMap<String, NodeSet>,
}

impl StaticTopology {
    pub fn new(masters: HashMap<String, NodeSet>) -> Self {
        Self { masters }
    }
}

impl TopologyResolver for StaticTopology {
    fn resolve_master(&self, master_name: &str, _sentinels: &[String]) -> Result<NodeSet, ProxyError> {
        self.masters.get(master_name).cloned().ok_or_else(|| {
            ProxyError::UpstreamUnavailable(format!("unknown sentinel master '{master_name}'"))
        })
    }
}
