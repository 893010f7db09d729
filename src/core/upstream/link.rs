// src/core/upstream/link.rs

//! A single pipelined connection to one upstream node.
//!
//! Requests are written in submission order and replies are matched to
//! requests first-in first-out, so many commands can be in flight at once on
//! one socket.

use crate::core::ProxyError;
use crate::core::metrics;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::routing::UpstreamAddr;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

type ReplySender = oneshot::Sender<Result<RespFrame, ProxyError>>;

/// One request queued for the link's I/O task.
struct LinkRequest {
    frame: RespFrame,
    reply_tx: ReplySender,
}

/// A handle to a pipelined upstream connection. Cheap to share; the socket
/// itself is owned by a background task.
#[derive(Debug)]
pub struct UpstreamLink {
    addr: UpstreamAddr,
    tx: mpsc::Sender<LinkRequest>,
    alive: Arc<AtomicBool>,
}

impl UpstreamLink {
    /// Spawns the I/O task for `addr`. The connection is established by the
    /// task itself; requests queued meanwhile are sent once it is up.
    pub fn spawn(addr: UpstreamAddr, connect_timeout: Duration, max_pending: usize) -> Self {
        let (tx, rx) = mpsc::channel(max_pending.max(1));
        let alive = Arc::new(AtomicBool::new(true));
        tokio::spawn(run_link(addr.clone(), rx, alive.clone(), connect_timeout));
        Self { addr, tx, alive }
    }

    /// False once the connection failed or was closed; the pool replaces dead links.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Queues a frame and waits for its reply.
    pub async fn send(&self, frame: RespFrame) -> Result<RespFrame, ProxyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = LinkRequest { frame, reply_tx };
        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => return Err(ProxyError::TooBusy),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                return Err(ProxyError::UpstreamUnavailable(self.addr.to_string()));
            }
        }
        reply_rx
            .await
            .unwrap_or_else(|_| Err(ProxyError::UpstreamUnavailable(self.addr.to_string())))
    }
}

async fn run_link(
    addr: UpstreamAddr,
    mut rx: mpsc::Receiver<LinkRequest>,
    alive: Arc<AtomicBool>,
    connect_timeout: Duration,
) {
    let mut framed = match connect(&addr, connect_timeout).await {
        Ok(framed) => framed,
        Err(e) => {
            warn!("Failed to connect to upstream {}: {}", addr, e);
            metrics::UPSTREAM_ERRORS_TOTAL.inc();
            shut_down(&addr, &alive, &mut rx, VecDeque::new());
            return;
        }
    };
    debug!("Upstream link to {} established.", addr);

    let mut pending: VecDeque<ReplySender> = VecDeque::new();
    let mut handles_dropped = false;
    let failure = loop {
        if handles_dropped && pending.is_empty() {
            break None;
        }
        tokio::select! {
            request = rx.recv(), if !handles_dropped => {
                let Some(request) = request else {
                    handles_dropped = true;
                    continue;
                };
                if let Err(e) = framed.feed(request.frame).await {
                    let _ = request.reply_tx.send(Err(ProxyError::UpstreamUnavailable(addr.to_string())));
                    break Some(e);
                }
                pending.push_back(request.reply_tx);
                // Coalesce whatever else is already queued into the same flush.
                let mut feed_error = None;
                while let Ok(next) = rx.try_recv() {
                    if let Err(e) = framed.feed(next.frame).await {
                        let _ = next.reply_tx.send(Err(ProxyError::UpstreamUnavailable(addr.to_string())));
                        feed_error = Some(e);
                        break;
                    }
                    pending.push_back(next.reply_tx);
                }
                if let Some(e) = feed_error {
                    break Some(e);
                }
                if let Err(e) = framed.flush().await {
                    break Some(e);
                }
            }
            reply = framed.next(), if !pending.is_empty() => {
                match reply {
                    Some(Ok(frame)) => {
                        if let Some(reply_tx) = pending.pop_front() {
                            // The caller may have timed out and gone away.
                            let _ = reply_tx.send(Ok(frame));
                        }
                    }
                    Some(Err(e)) => break Some(e),
                    None => break Some(ProxyError::UpstreamUnavailable(format!("{addr} closed the connection"))),
                }
            }
        }
    };

    if let Some(e) = failure {
        warn!("Upstream link to {} failed: {}", addr, e);
        metrics::UPSTREAM_ERRORS_TOTAL.inc();
    }
    shut_down(&addr, &alive, &mut rx, pending);
}

/// Marks the link dead and fails every request that will never be answered.
fn shut_down(
    addr: &UpstreamAddr,
    alive: &AtomicBool,
    rx: &mut mpsc::Receiver<LinkRequest>,
    pending: VecDeque<ReplySender>,
) {
    alive.store(false, Ordering::Release);
    rx.close();
    let unavailable = || Err(ProxyError::UpstreamUnavailable(addr.to_string()));
    for reply_tx in pending {
        let _ = reply_tx.send(unavailable());
    }
    while let Ok(request) = rx.try_recv() {
        let _ = request.reply_tx.send(unavailable());
    }
}

/// Opens the socket and performs the AUTH/SELECT handshake.
async fn connect(
    addr: &UpstreamAddr,
    connect_timeout: Duration,
) -> Result<Framed<TcpStream, RespFrameCodec>, ProxyError> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr.socket_target()))
        .await
        .map_err(|_| ProxyError::UpstreamUnavailable(format!("{addr} connect timeout")))??;
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, RespFrameCodec);

    if let Some(password) = &addr.password {
        let mut args = vec![RespFrame::BulkString(Bytes::from_static(b"AUTH"))];
        if let Some(user) = &addr.username {
            args.push(RespFrame::BulkString(Bytes::from(user.clone())));
        }
        args.push(RespFrame::BulkString(Bytes::from(password.clone())));
        handshake(&mut framed, addr, RespFrame::Array(args)).await?;
    }
    if addr.db != 0 {
        let select = RespFrame::Array(vec![
            RespFrame::BulkString(Bytes::from_static(b"SELECT")),
            RespFrame::BulkString(Bytes::from(addr.db.to_string())),
        ]);
        handshake(&mut framed, addr, select).await?;
    }
    Ok(framed)
}

async fn handshake(
    framed: &mut Framed<TcpStream, RespFrameCodec>,
    addr: &UpstreamAddr,
    frame: RespFrame,
) -> Result<(), ProxyError> {
    framed.send(frame).await?;
    match framed.next().await {
        Some(Ok(RespFrame::Error(msg))) => Err(ProxyError::UpstreamUnavailable(format!(
            "{addr} rejected handshake: {msg}"
        ))),
        Some(Ok(_)) => Ok(()),
        Some(Err(e)) => Err(e),
        None => Err(ProxyError::UpstreamUnavailable(format!(
            "{addr} closed the connection during handshake"
        ))),
    }
}
