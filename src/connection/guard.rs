// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::metrics;
use crate::core::state::ProxyState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Removes a connection from the client registry when its handler exits, on
/// every path out of the handler.
pub struct ConnectionGuard {
    state: Arc<ProxyState>,
    client_id: u64,
    addr: SocketAddr,
}

impl ConnectionGuard {
    pub(crate) fn new(state: Arc<ProxyState>, client_id: u64, addr: SocketAddr) -> Self {
        metrics::CONNECTED_CLIENTS.inc();
        Self {
            state,
            client_id,
            addr,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(
            "ConnectionGuard dropping, cleaning up resources for connection {}",
            self.addr
        );
        if self.state.clients.remove(self.client_id).is_none() {
            debug!(
                "Client {} was not in the client registry upon cleanup.",
                self.addr
            );
        }
    }
}
