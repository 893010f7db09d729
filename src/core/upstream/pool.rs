// src/core/upstream/pool.rs

//! The connection pool seam. Templates never own sockets; they hand commands
//! to an `UpstreamPool`, which multiplexes them over shared links.

use super::link::UpstreamLink;
use crate::core::ProxyError;
use crate::core::protocol::{Command, RespFrame};
use crate::core::routing::UpstreamAddr;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Sends commands to upstream addresses and yields their replies.
///
/// Implementations must not block the caller while the reply is outstanding,
/// and must preserve submission order for commands sent to the same address
/// over a single link.
#[async_trait]
pub trait UpstreamPool: Send + Sync + std::fmt::Debug {
    async fn send(&self, addr: &UpstreamAddr, command: Command) -> Result<RespFrame, ProxyError>;

    /// Number of live links per address, for INFO.
    fn link_counts(&self) -> Vec<(UpstreamAddr, usize)> {
        Vec::new()
    }

    /// Forgets every link. Their sockets close once in-flight replies drain.
    fn close_all(&self) {}
}

/// Tunables for `RedisConnectionPool`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub connections_per_addr: usize,
    pub connect_timeout: Duration,
    pub max_pending_per_link: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connections_per_addr: 1,
            connect_timeout: Duration::from_secs(2),
            max_pending_per_link: 4096,
        }
    }
}

/// The production pool: a fixed number of pipelined links per upstream
/// address, created on first use and replaced when they die.
#[derive(Debug)]
pub struct RedisConnectionPool {
    config: PoolConfig,
    links: DashMap<UpstreamAddr, Vec<Arc<UpstreamLink>>>,
    cursor: AtomicUsize,
}

impl RedisConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            links: DashMap::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Picks a link for `addr`, spawning or replacing links as needed.
    fn checkout(&self, addr: &UpstreamAddr) -> Arc<UpstreamLink> {
        let per_addr = self.config.connections_per_addr.max(1);
        let index = if per_addr == 1 {
            0
        } else {
            self.cursor.fetch_add(1, Ordering::Relaxed) % per_addr
        };

        if let Some(links) = self.links.get(addr)
            && let Some(link) = links.get(index)
            && link.is_alive()
        {
            return link.clone();
        }

        let mut links = self.links.entry(addr.clone()).or_default();
        while links.len() <= index {
            links.push(Arc::new(self.spawn_link(addr)));
        }
        if !links[index].is_alive() {
            debug!("Replacing dead upstream link to {}", addr);
            links[index] = Arc::new(self.spawn_link(addr));
        }
        links[index].clone()
    }

    fn spawn_link(&self, addr: &UpstreamAddr) -> UpstreamLink {
        UpstreamLink::spawn(
            addr.clone(),
            self.config.connect_timeout,
            self.config.max_pending_per_link,
        )
    }
}

#[async_trait]
impl UpstreamPool for RedisConnectionPool {
    async fn send(&self, addr: &UpstreamAddr, command: Command) -> Result<RespFrame, ProxyError> {
        let link = self.checkout(addr);
        link.send(command.to_frame()).await
    }

    fn link_counts(&self) -> Vec<(UpstreamAddr, usize)> {
        self.links
            .iter()
            .map(|entry| {
                let alive = entry.value().iter().filter(|l| l.is_alive()).count();
                (entry.key().clone(), alive)
            })
            .collect()
    }

    fn close_all(&self) {
        self.links.clear();
    }
}
