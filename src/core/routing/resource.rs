// src/core/routing/resource.rs

//! Defines `Resource`, the upstream description a tenant is routed to.

use super::addr::UpstreamAddr;
use super::slot::NUM_SLOTS;
use crate::core::ProxyError;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// How read-only commands pick a node out of a `NodeSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ReadPolicy {
    /// Reads go to the primary like everything else.
    #[default]
    Primary,
    /// Reads rotate over the replicas; the primary is used if there are none.
    Replicas,
    /// Reads rotate over the primary and all replicas.
    RoundRobin,
    /// Reads go to a random replica; the primary is used if there are none.
    RandomReplica,
}

/// A primary node and its read replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSet {
    pub primary: UpstreamAddr,
    #[serde(default)]
    pub replicas: Vec<UpstreamAddr>,
}

impl NodeSet {
    pub fn single(primary: UpstreamAddr) -> Self {
        Self {
            primary,
            replicas: Vec::new(),
        }
    }

    /// Every address in the set, primary first.
    pub fn addrs(&self) -> impl Iterator<Item = &UpstreamAddr> {
        std::iter::once(&self.primary).chain(self.replicas.iter())
    }
}

/// An inclusive slot range owned by one node set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    #[serde(flatten)]
    pub nodes: NodeSet,
}

/// The upstream a tenant is routed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Resource {
    /// A single node.
    Standalone { addr: UpstreamAddr },
    /// A fixed primary with read replicas.
    ReadWriteSplit {
        primary: UpstreamAddr,
        #[serde(default)]
        replicas: Vec<UpstreamAddr>,
        #[serde(default)]
        read_policy: ReadPolicy,
    },
    /// A sentinel-managed group; its nodes come from the topology resolver.
    Sentinel {
        master_name: String,
        #[serde(default)]
        sentinels: Vec<String>,
        #[serde(default)]
        read_policy: ReadPolicy,
    },
    /// A cluster described by its slot ownership.
    Cluster {
        slots: Vec<SlotRange>,
        #[serde(default)]
        read_policy: ReadPolicy,
    },
    /// A custom shard set; a key goes to shard `slot % shards.len()`.
    Sharded {
        shards: Vec<NodeSet>,
        #[serde(default)]
        read_policy: ReadPolicy,
    },
}

impl Resource {
    pub fn read_policy(&self) -> ReadPolicy {
        match self {
            Resource::Standalone { .. } => ReadPolicy::Primary,
            Resource::ReadWriteSplit { read_policy, .. }
            | Resource::Sentinel { read_policy, .. }
            | Resource::Cluster { read_policy, .. }
            | Resource::Sharded { read_policy, .. } => *read_policy,
        }
    }

    /// Checks the structural rules a resource must satisfy before it can be
    /// installed in a route table.
    pub fn validate(&self) -> Result<(), ProxyError> {
        match self {
            Resource::Standalone { .. } | Resource::ReadWriteSplit { .. } => Ok(()),
            Resource::Sentinel { master_name, .. } => {
                if master_name.trim().is_empty() {
                    return Err(ProxyError::InvalidRoute(
                        "sentinel master_name cannot be empty".into(),
                    ));
                }
                Ok(())
            }
            Resource::Cluster { slots, .. } => {
                if slots.is_empty() {
                    return Err(ProxyError::InvalidRoute(
                        "cluster resource needs at least one slot range".into(),
                    ));
                }
                let mut covered = vec![false; NUM_SLOTS];
                for range in slots {
                    if range.start > range.end || range.end as usize >= NUM_SLOTS {
                        return Err(ProxyError::InvalidRoute(format!(
                            "bad slot range {}-{}",
                            range.start, range.end
                        )));
                    }
                    for slot in range.start..=range.end {
                        if std::mem::replace(&mut covered[slot as usize], true) {
                            return Err(ProxyError::InvalidRoute(format!(
                                "slot {slot} is assigned twice"
                            )));
                        }
                    }
                }
                Ok(())
            }
            Resource::Sharded { shards, .. } => {
                if shards.is_empty() {
                    return Err(ProxyError::InvalidRoute(
                        "sharded resource needs at least one shard".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Every statically known upstream address of this resource.
    pub fn addrs(&self) -> Vec<&UpstreamAddr> {
        match self {
            Resource::Standalone { addr } => vec![addr],
            Resource::ReadWriteSplit {
                primary, replicas, ..
            } => std::iter::once(primary).chain(replicas.iter()).collect(),
            Resource::Sentinel { .. } => Vec::new(),
            Resource::Cluster { slots, .. } => slots.iter().flat_map(|r| r.nodes.addrs()).collect(),
            Resource::Sharded { shards, .. } => shards.iter().flat_map(NodeSet::addrs).collect(),
        }
    }
}
