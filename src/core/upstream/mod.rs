// src/core/upstream/mod.rs

//! Everything between a routed command and the upstream wire: the pooled,
//! pipelined links, the per-tenant templates, and the factory that caches them.

mod fanout;
pub mod factory;
pub mod link;
pub mod pool;
pub mod template;

pub use factory::TemplateFactory;
pub use pool::{PoolConfig, RedisConnectionPool, UpstreamPool};
pub use template::UpstreamTemplate;
