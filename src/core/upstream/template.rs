// src/core/upstream/template.rs

//! Defines `UpstreamTemplate`, the per-tenant sender bound to one route table
//! snapshot.

use super::fanout;
use super::pool::UpstreamPool;
use crate::core::ProxyError;
use crate::core::commands::{CommandFlags, CommandKind};
use crate::core::protocol::{Command, RespFrame};
use crate::core::routing::slot::{NUM_SLOTS, get_slot};
use crate::core::routing::{
    NodeSet, ReadPolicy, Resource, RouteTable, TenantKey, TopologyResolver, UpstreamAddr, resolve,
};
use futures::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

const UNASSIGNED: u32 = u32::MAX;

/// Where the keys of a resource live, resolved once when the template is built.
enum Topology {
    Single(NodeSet),
    /// `owners[slot]` indexes into `sets`, or is `UNASSIGNED`.
    Slots {
        owners: Vec<u32>,
        sets: Vec<NodeSet>,
    },
    /// Shard index is `slot % sets.len()`.
    Modulo(Vec<NodeSet>),
}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topology::Single(nodes) => f.debug_tuple("Single").field(nodes).finish(),
            Topology::Slots { sets, .. } => f.debug_struct("Slots").field("sets", sets).finish(),
            Topology::Modulo(sets) => f.debug_tuple("Modulo").field(sets).finish(),
        }
    }
}

impl Topology {
    fn build(resource: &Resource, resolver: &dyn TopologyResolver) -> Result<Self, ProxyError> {
        Ok(match resource {
            Resource::Standalone { addr } => Topology::Single(NodeSet::single(addr.clone())),
            Resource::ReadWriteSplit {
                primary, replicas, ..
            } => Topology::Single(NodeSet {
                primary: primary.clone(),
                replicas: replicas.clone(),
            }),
            Resource::Sentinel {
                master_name,
                sentinels,
                ..
            } => Topology::Single(resolver.resolve_master(master_name, sentinels)?),
            Resource::Cluster { slots, .. } => {
                let mut owners = vec![UNASSIGNED; NUM_SLOTS];
                let mut sets = Vec::with_capacity(slots.len());
                for range in slots {
                    let index = sets.len() as u32;
                    sets.push(range.nodes.clone());
                    owners[range.start as usize..=range.end as usize].fill(index);
                }
                Topology::Slots { owners, sets }
            }
            Resource::Sharded { shards, .. } => Topology::Modulo(shards.clone()),
        })
    }

    fn shard_count(&self) -> usize {
        match self {
            Topology::Single(_) => 1,
            Topology::Slots { sets, .. } | Topology::Modulo(sets) => sets.len(),
        }
    }

    fn nodes(&self, shard: usize) -> &NodeSet {
        match self {
            Topology::Single(nodes) => nodes,
            Topology::Slots { sets, .. } | Topology::Modulo(sets) => &sets[shard],
        }
    }

    fn shard_of(&self, key: &[u8]) -> Result<usize, ProxyError> {
        match self {
            Topology::Single(_) => Ok(0),
            Topology::Slots { owners, .. } => {
                let slot = get_slot(key);
                match owners[slot as usize] {
                    UNASSIGNED => Err(ProxyError::UpstreamUnavailable(format!(
                        "hash slot {slot} is not served"
                    ))),
                    index => Ok(index as usize),
                }
            }
            Topology::Modulo(sets) => Ok(get_slot(key) as usize % sets.len()),
        }
    }
}

/// A sender bound to one tenant and one route table version.
///
/// Templates are immutable once built. When routes change, the factory builds
/// a new template and callers that already hold the old one finish with it.
#[derive(Debug)]
pub struct UpstreamTemplate {
    tenant: TenantKey,
    version: u64,
    routing: Result<(Arc<Resource>, Topology), ProxyError>,
    pool: Arc<dyn UpstreamPool>,
    read_cursor: AtomicUsize,
}

impl UpstreamTemplate {
    /// Resolves `tenant` against `table`. Resolution failures are kept and
    /// reported as an error reply for every command sent through the template.
    pub fn new(
        tenant: TenantKey,
        table: &RouteTable,
        pool: Arc<dyn UpstreamPool>,
        resolver: &dyn TopologyResolver,
    ) -> Self {
        let routing = resolve(table, &tenant).and_then(|resource| {
            let topology = Topology::build(&resource, resolver)?;
            Ok((resource, topology))
        });
        if let Err(e) = &routing {
            debug!("Template for tenant {} has no usable route: {}", tenant, e);
        }
        Self {
            tenant,
            version: table.version(),
            routing,
            pool,
            read_cursor: AtomicUsize::new(0),
        }
    }

    pub fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    /// The route table version this template was built from.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The resource this template sends to, if the tenant resolved.
    pub fn resource(&self) -> Option<&Arc<Resource>> {
        self.routing.as_ref().ok().map(|(resource, _)| resource)
    }

    /// Sends a command to the tenant's resource. Never fails: routing and pool
    /// errors come back as error replies.
    pub async fn send(&self, command: Command) -> RespFrame {
        match self.try_send(command).await {
            Ok(frame) => frame,
            Err(e) => e.into(),
        }
    }

    async fn try_send(&self, command: Command) -> Result<RespFrame, ProxyError> {
        let (resource, topology) = self.routing.as_ref().map_err(Clone::clone)?;
        let policy = resource.read_policy();

        if topology.shard_count() == 1 {
            let addr = self.select(topology.nodes(0), command.kind(), policy);
            return self.pool.send(addr, command).await;
        }

        let keys = command.keys();
        let Some(first) = keys.first() else {
            let node_scoped = command
                .spec()
                .is_none_or(|spec| spec.flags.contains(CommandFlags::NODE_SCOPED));
            if node_scoped {
                return Err(ProxyError::UnsupportedCommand(command.name().to_string()));
            }
            let addr = self.select(topology.nodes(0), command.kind(), policy);
            return self.pool.send(addr, command).await;
        };

        let shard = topology.shard_of(first)?;
        let mut single_shard = true;
        for key in &keys[1..] {
            if topology.shard_of(key)? != shard {
                single_shard = false;
                break;
            }
        }
        if single_shard {
            let addr = self.select(topology.nodes(shard), command.kind(), policy);
            return self.pool.send(addr, command).await;
        }

        let fans_out = command
            .spec()
            .is_some_and(|spec| spec.flags.contains(CommandFlags::FANOUT));
        if !fans_out {
            return Err(ProxyError::CrossSlot);
        }
        self.fan_out(&command, topology, policy).await
    }

    async fn fan_out(
        &self,
        command: &Command,
        topology: &Topology,
        policy: ReadPolicy,
    ) -> Result<RespFrame, ProxyError> {
        let (requests, merge) = fanout::split(command, |key| topology.shard_of(key))?;
        let kind = command.kind();
        let sends = requests.into_iter().map(|request| {
            let addr = self.select(topology.nodes(request.shard), kind, policy);
            let positions = request.positions;
            let pending = self.pool.send(addr, request.command);
            async move {
                let frame = pending.await.unwrap_or_else(RespFrame::from);
                (positions, frame)
            }
        });
        let parts = join_all(sends).await;
        Ok(fanout::merge(merge, parts))
    }

    /// Picks the node for a command. Only reads are ever sent to replicas.
    fn select<'a>(&self, nodes: &'a NodeSet, kind: CommandKind, policy: ReadPolicy) -> &'a UpstreamAddr {
        if kind != CommandKind::Read {
            return &nodes.primary;
        }
        match policy {
            ReadPolicy::Primary => &nodes.primary,
            ReadPolicy::Replicas if nodes.replicas.is_empty() => &nodes.primary,
            ReadPolicy::Replicas => {
                let n = self.read_cursor.fetch_add(1, Ordering::Relaxed);
                &nodes.replicas[n % nodes.replicas.len()]
            }
            ReadPolicy::RoundRobin => {
                let n = self.read_cursor.fetch_add(1, Ordering::Relaxed);
                match n % (nodes.replicas.len() + 1) {
                    0 => &nodes.primary,
                    i => &nodes.replicas[i - 1],
                }
            }
            ReadPolicy::RandomReplica if nodes.replicas.is_empty() => &nodes.primary,
            ReadPolicy::RandomReplica => {
                let i = rand::thread_rng().gen_range(0..nodes.replicas.len());
                &nodes.replicas[i]
            }
        }
    }
}
