// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use super::stream::ClientStream;
use crate::connection::{ConnectionHandler, Invoker};
use crate::core::ProxyError;
use crate::core::metrics;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::state::ProxyState;
use anyhow::{Result, anyhow};
use futures::SinkExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{OwnedSemaphorePermit, broadcast};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// The main server loop that accepts connections and handles graceful shutdown.
pub async fn run(mut ctx: ServerContext) -> Result<()> {
    let mut client_tasks = JoinSet::new();

    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                let (socket, addr) = match res {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
                if let Err(e) = socket.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                }

                let Ok(permit) = ctx.connection_permits.clone().try_acquire_owned() else {
                    warn!("Rejecting connection from {}: max number of clients reached.", addr);
                    client_tasks.spawn(reject_connection(socket));
                    continue;
                };
                debug!("Accepted new connection from: {}", addr);

                client_tasks.spawn(serve_connection(
                    socket,
                    addr,
                    ctx.state.clone(),
                    ctx.invoker.clone(),
                    ctx.acceptor.clone(),
                    ctx.shutdown_tx.subscribe(),
                    permit,
                ));
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        debug!("No task was listening for the shutdown signal.");
    }

    // Handlers flush their goodbye frame on the broadcast; give them a moment
    // before the remaining tasks are aborted.
    if tokio::time::timeout(Duration::from_secs(5), async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for client connections to close.");
        client_tasks.shutdown().await;
    }
    info!("All client connections closed.");

    ctx.state.templates.pool().close_all();
    info!("Upstream connections released.");

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Proxy shutdown complete.");
    Ok(())
}

/// Runs one client connection to completion, performing the TLS handshake
/// first when an acceptor is configured.
async fn serve_connection(
    socket: TcpStream,
    addr: SocketAddr,
    state: Arc<ProxyState>,
    invoker: Invoker,
    acceptor: Option<TlsAcceptor>,
    global_shutdown_rx: broadcast::Receiver<()>,
    _permit: OwnedSemaphorePermit,
) {
    let stream = match acceptor {
        Some(acceptor) => match acceptor.accept(socket).await {
            Ok(tls_stream) => {
                debug!("TLS handshake successful for {addr}");
                ClientStream::Tls(Box::new(tls_stream))
            }
            Err(e) => {
                warn!("TLS handshake error for {addr}: {e}");
                return;
            }
        },
        None => ClientStream::Plain(socket),
    };

    let mut handler = ConnectionHandler::new(stream, addr, state, invoker, global_shutdown_rx);
    if let Err(e) = handler.run().await {
        warn!("Connection from {} terminated unexpectedly: {}", addr, e);
    }
}

/// Tells a client over the connection limit why it is being dropped.
async fn reject_connection(socket: TcpStream) {
    let mut framed = Framed::new(socket, RespFrameCodec);
    let _ = framed
        .send(RespFrame::from(ProxyError::MaxClientsReached))
        .await;
}
