// src/server/context.rs

use crate::connection::Invoker;
use crate::core::state::ProxyState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

/// Holds all the initialized state required to run the proxy's main loop.
pub struct ServerContext {
    pub state: Arc<ProxyState>,
    pub invoker: Invoker,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub acceptor: Option<TlsAcceptor>,
    /// One permit per connected client, capped at `max_clients`.
    pub connection_permits: Arc<Semaphore>,
}
