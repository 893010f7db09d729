// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ConnectionGuard;
use super::invoker::{ConnectionContext, Invoker};
use super::session::SessionState;
use crate::core::ProxyError;
use crate::core::protocol::{Command, RespFrame, RespFrameCodec};
use crate::core::state::ProxyState;
use crate::core::transponder::Outbound;
use futures::{FutureExt, SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// Upper bound on how many already-buffered frames are folded into one batch.
const MAX_BATCH: usize = 1024;

/// What became of one batch read from the client.
enum BatchOutcome {
    Dispatched,
    /// The batch ended in undecodable input. Commands before it were
    /// dispatched; nothing after it is read.
    ProtocolError(ProxyError),
    /// The connection can no longer be used.
    Fatal,
}

/// Manages the full lifecycle of a client connection.
///
/// The read side decodes frames and hands whole batches to the invoker. The
/// write side only ever writes what the transponder releases, in order.
pub struct ConnectionHandler<S> {
    framed: Framed<S, RespFrameCodec>,
    addr: SocketAddr,
    state: Arc<ProxyState>,
    invoker: Invoker,
    ctx: ConnectionContext,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    shutdown_rx: broadcast::Receiver<()>,
    global_shutdown_rx: broadcast::Receiver<()>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Creates a new `ConnectionHandler` and registers the client.
    pub fn new(
        socket: S,
        addr: SocketAddr,
        state: Arc<ProxyState>,
        invoker: Invoker,
        global_shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let client_id = state.next_client_id();
        let session = SessionState::new(client_id, addr, state.auth.is_required());
        let shutdown_rx = state
            .clients
            .register(client_id, addr, session.tenant.clone());
        state.stats.increment_total_connections();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let ctx = ConnectionContext::new(session, outbound_tx, state.max_pending_per_connection);
        Self {
            framed: Framed::new(socket, RespFrameCodec),
            addr,
            state,
            invoker,
            ctx,
            outbound_rx,
            shutdown_rx,
            global_shutdown_rx,
        }
    }

    pub fn client_id(&self) -> u64 {
        self.ctx.session.client_id
    }

    /// The main event loop for the connection, handling incoming frames,
    /// released replies and signals.
    pub async fn run(&mut self) -> Result<(), ProxyError> {
        let _guard = ConnectionGuard::new(self.state.clone(), self.client_id(), self.addr);
        // Set when the client half-closes or sends garbage; replies still
        // owed are written first.
        let mut read_closed = false;
        let mut protocol_error = None;
        loop {
            if read_closed && self.drained() {
                match protocol_error.take() {
                    Some(e) => {
                        warn!("Closing connection {} after a protocol error: {}", self.addr, e);
                        let _ = self.framed.send(RespFrame::from(e)).await;
                    }
                    None => debug!("Connection from {} closed by peer.", self.addr),
                }
                break;
            }
            tokio::select! {
                // Prioritize shutdown signals over other events.
                biased;
                _ = self.global_shutdown_rx.recv() => {
                    info!("Connection handler for {} received GLOBAL shutdown signal.", self.addr);
                    let shutdown_msg = RespFrame::Error("SHUTDOWN Proxy is shutting down".to_string());
                    let _ = self.framed.send(shutdown_msg).await;
                    break;
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Connection handler for {} received kill signal.", self.addr);
                    break;
                }
                outbound = self.outbound_rx.recv() => {
                    let Some(outbound) = outbound else {
                        break;
                    };
                    if self.write_released(outbound).await? {
                        debug!("Closing connection {} after QUIT.", self.addr);
                        break;
                    }
                }
                result = self.framed.next(), if !self.ctx.is_closing() && !read_closed => {
                    match result {
                        Some(Ok(frame)) => match self.handle_frames(frame) {
                            BatchOutcome::Dispatched => {}
                            BatchOutcome::ProtocolError(e) => {
                                read_closed = true;
                                protocol_error = Some(e);
                            }
                            BatchOutcome::Fatal => break,
                        },
                        Some(Err(e @ ProxyError::Protocol(_))) => {
                            read_closed = true;
                            protocol_error = Some(e);
                        }
                        Some(Err(e)) => {
                            if is_normal_disconnect(&e) {
                                debug!("Connection from {} closed by peer: {}", self.addr, e);
                            } else {
                                warn!("Connection error for {}: {}", self.addr, e);
                            }
                            break;
                        }
                        None => read_closed = true,
                    }
                }
            }
        }
        Ok(())
    }

    /// True when every reply owed to the client has been written.
    ///
    /// The slot queue is read before the channel: a slot leaves the queue only
    /// after its frame is on the channel, so an empty queue followed by an
    /// empty channel means nothing is left in flight.
    fn drained(&self) -> bool {
        self.ctx.transponder().is_none_or(|t| t.pending() == 0) && self.outbound_rx.is_empty()
    }

    /// Writes `first` and everything else already released, then flushes.
    /// Returns true if the connection should close.
    async fn write_released(&mut self, first: Outbound) -> Result<bool, ProxyError> {
        let mut next = Some(first);
        while let Some(outbound) = next.take() {
            match outbound {
                Outbound::Frame(frame) => self.framed.feed(frame).await?,
                Outbound::Close => {
                    self.framed.flush().await?;
                    return Ok(true);
                }
            }
            next = self.outbound_rx.try_recv().ok();
        }
        self.framed.flush().await?;
        Ok(false)
    }

    /// Folds `first` and any frames already decoded into one batch and hands
    /// it to the invoker.
    fn handle_frames(&mut self, first: RespFrame) -> BatchOutcome {
        let mut frames = vec![first];
        let mut decode_error = None;
        while frames.len() < MAX_BATCH {
            match self.framed.next().now_or_never() {
                Some(Some(Ok(frame))) => frames.push(frame),
                Some(Some(Err(e))) => {
                    decode_error = Some(e);
                    break;
                }
                Some(None) | None => break,
            }
        }

        let mut batch = Vec::with_capacity(frames.len());
        for frame in frames {
            match Command::from_frame(frame) {
                Ok(Some(command)) => batch.push(command),
                Ok(None) => {}
                Err(e) => {
                    decode_error = Some(e);
                    break;
                }
            }
        }

        debug!(
            "Client {}: dispatching a batch of {} command(s).",
            self.client_id(),
            batch.len()
        );
        if let Err(e) = self.invoker.invoke(&mut self.ctx, batch) {
            error!("Closing connection {} after a fatal error: {}", self.addr, e);
            return BatchOutcome::Fatal;
        }
        match decode_error {
            Some(e) if e.is_connection_fatal() && !matches!(e, ProxyError::Protocol(_)) => {
                warn!("Connection error for {}: {}", self.addr, e);
                BatchOutcome::Fatal
            }
            Some(e) => BatchOutcome::ProtocolError(e),
            None => BatchOutcome::Dispatched,
        }
    }
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &ProxyError) -> bool {
    matches!(e, ProxyError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
