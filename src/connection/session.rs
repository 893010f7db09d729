// src/connection/session.rs

//! Defines the state associated with a single client session.

use crate::core::routing::TenantKey;
use std::net::SocketAddr;

/// Holds the state specific to a single client session. Owned by the
/// connection's task and passed explicitly to whatever needs it.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// The unique identifier of this connection.
    pub client_id: u64,
    /// The network address of the client.
    pub addr: SocketAddr,
    /// True if the client has successfully authenticated, or if no
    /// authentication is required.
    pub is_authenticated: bool,
    /// The routing domain bound by a successful `AUTH`. `None` until then.
    pub tenant: Option<TenantKey>,
    /// Set via `CLIENT SETNAME`.
    pub name: Option<String>,
    /// Set once `QUIT` is processed; nothing after it is dispatched.
    pub quit_requested: bool,
}

impl SessionState {
    /// Creates a new `SessionState`. Sessions that need no authentication
    /// start usable but unbound, so a later `AUTH` may still pick a tenant.
    pub fn new(client_id: u64, addr: SocketAddr, is_auth_required: bool) -> Self {
        Self {
            client_id,
            addr,
            is_authenticated: !is_auth_required,
            tenant: None,
            name: None,
            quit_requested: false,
        }
    }

    /// The tenant commands are routed for. Unbound sessions use the default
    /// tenant; they can only get this far when authentication is optional.
    pub fn tenant(&self) -> TenantKey {
        self.tenant.clone().unwrap_or_default()
    }
}
