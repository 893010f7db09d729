// src/core/routing/mod.rs

//! Tenant routing: which upstream resource serves which tenant, held as a
//! versioned, atomically swapped snapshot.

pub mod addr;
pub mod resource;
pub mod slot;
pub mod table;
pub mod tenant;
pub mod topology;

pub use addr::UpstreamAddr;
pub use resource::{NodeSet, ReadPolicy, Resource, SlotRange};
pub use table::{RouteTable, RouteTableStore, resolve};
pub use tenant::TenantKey;
pub use topology::{StaticTopology, TopologyResolver};
