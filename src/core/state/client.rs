// src/core/state/client.rs

//! Contains state definitions related to client connections.

use crate::core::routing::TenantKey;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::broadcast;

pub type ShutdownSender = broadcast::Sender<()>;

/// What the registry knows about one live connection.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub addr: SocketAddr,
    pub client_id: u64,
    pub name: Option<String>,
    /// `None` until the connection authenticates.
    pub tenant: Option<TenantKey>,
    pub created: Instant,
    pub last_command_time: Instant,
}

#[derive(Debug)]
struct ClientEntry {
    info: ClientInfo,
    shutdown_tx: ShutdownSender,
}

/// Tracks every live connection for diagnostics and targeted shutdown. The
/// connection tasks own their sessions; this only mirrors what INFO needs.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<u64, ClientEntry>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection and returns the receiver it should watch
    /// for a targeted shutdown.
    pub fn register(
        &self,
        client_id: u64,
        addr: SocketAddr,
        tenant: Option<TenantKey>,
    ) -> broadcast::Receiver<()> {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let now = Instant::now();
        self.clients.insert(
            client_id,
            ClientEntry {
                info: ClientInfo {
                    addr,
                    client_id,
                    name: None,
                    tenant,
                    created: now,
                    last_command_time: now,
                },
                shutdown_tx,
            },
        );
        shutdown_rx
    }

    pub fn remove(&self, client_id: u64) -> Option<ClientInfo> {
        self.clients.remove(&client_id).map(|(_, entry)| entry.info)
    }

    /// Records the tenant a connection authenticated as.
    pub fn bind_tenant(&self, client_id: u64, tenant: TenantKey) {
        if let Some(mut entry) = self.clients.get_mut(&client_id) {
            entry.info.tenant = Some(tenant);
        }
    }

    pub fn set_name(&self, client_id: u64, name: Option<String>) {
        if let Some(mut entry) = self.clients.get_mut(&client_id) {
            entry.info.name = name;
        }
    }

    /// Marks the connection as active now.
    pub fn touch(&self, client_id: u64) {
        if let Some(mut entry) = self.clients.get_mut(&client_id) {
            entry.info.last_command_time = Instant::now();
        }
    }

    /// Asks one connection to close. Returns false if it is not registered.
    pub fn kill(&self, client_id: u64) -> bool {
        match self.clients.get(&client_id) {
            Some(entry) => entry.shutdown_tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn get(&self, client_id: u64) -> Option<ClientInfo> {
        self.clients.get(&client_id).map(|e| e.info.clone())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Connected clients per authenticated tenant, keyed by tenant label.
    pub fn tenant_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.clients.iter() {
            if let Some(tenant) = &entry.info.tenant {
                *counts.entry(tenant.label()).or_insert(0) += 1;
            }
        }
        counts
    }
}
