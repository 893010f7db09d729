// src/core/transponder.rs

//! The per-connection ordering engine.
//!
//! Every command gets a slot in a FIFO queue before it is dispatched. Replies
//! fill their slots in whatever order they complete, and only the filled
//! prefix of the queue is ever released to the writer. The client therefore
//! sees replies in exactly the order it sent the commands.

use crate::connection::SessionState;
use crate::core::ProxyError;
use crate::core::processor::{CommandProcessor, Dispatch};
use crate::core::protocol::{Command, RespFrame};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// What the connection writer receives, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Frame(RespFrame),
    /// Everything before this has been sent; close the connection.
    Close,
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

#[derive(Debug, Default)]
struct QueueState {
    /// Sequence number of the slot at the front of `slots`.
    base: u64,
    slots: VecDeque<Option<RespFrame>>,
    /// Once the slot with this sequence number drains, the connection closes.
    close_after: Option<u64>,
}

/// The slot queue. Shared between the connection task, which reserves slots,
/// and whichever tasks complete them.
#[derive(Debug)]
struct ReplyQueue {
    state: Mutex<QueueState>,
    out: OutboundSender,
}

impl ReplyQueue {
    fn reserve(&self) -> u64 {
        let mut state = self.state.lock();
        state.slots.push_back(None);
        state.base + state.slots.len() as u64 - 1
    }

    fn pending(&self) -> usize {
        self.state.lock().slots.len()
    }

    fn close_after(&self, seq: u64) {
        let mut state = self.state.lock();
        state.close_after = Some(seq);
        // The slot may already have drained.
        if seq < state.base {
            let _ = self.out.send(Outbound::Close);
        }
    }

    /// Fills slot `seq` and releases every reply that is now at the front.
    /// Draining under the lock keeps concurrent fillers from interleaving
    /// their sends.
    fn fill(&self, seq: u64, frame: RespFrame) {
        let mut state = self.state.lock();
        let Some(index) = seq.checked_sub(state.base) else {
            return;
        };
        match state.slots.get_mut(index as usize) {
            Some(slot) if slot.is_none() => *slot = Some(frame),
            _ => return,
        }

        while let Some(Some(_)) = state.slots.front() {
            let Some(Some(frame)) = state.slots.pop_front() else {
                break;
            };
            let drained = state.base;
            state.base += 1;
            // A closed channel means the connection is gone; keep draining
            // so the queue still empties.
            let _ = self.out.send(Outbound::Frame(frame));
            if state.close_after == Some(drained) {
                let _ = self.out.send(Outbound::Close);
            }
        }
    }
}

/// Fills its slot exactly once. If it is dropped unfilled, because the task
/// carrying it panicked or was cancelled, the slot gets an internal error so
/// later replies are not held back forever.
struct SlotFiller {
    queue: Arc<ReplyQueue>,
    seq: u64,
    filled: bool,
}

impl SlotFiller {
    fn fill(mut self, frame: RespFrame) {
        self.filled = true;
        self.queue.fill(self.seq, frame);
    }
}

impl Drop for SlotFiller {
    fn drop(&mut self) {
        if !self.filled {
            error!("Reply slot {} was abandoned; answering with an internal error.", self.seq);
            self.queue.fill(
                self.seq,
                ProxyError::Internal("command was dropped before it completed".into()).into(),
            );
        }
    }
}

/// One connection's transponder. Created on the connection's first batch and
/// kept until it closes.
#[derive(Debug)]
pub struct Transponder {
    queue: Arc<ReplyQueue>,
    max_pending: usize,
    closing: bool,
}

impl Transponder {
    pub fn new(out: OutboundSender, max_pending: usize) -> Self {
        Self {
            queue: Arc::new(ReplyQueue {
                state: Mutex::new(QueueState::default()),
                out,
            }),
            max_pending: max_pending.max(1),
            closing: false,
        }
    }

    /// Commands whose replies have not been released yet.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// True once a `QUIT` was accepted; later commands are ignored.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Reserves a slot for each command in order and dispatches them all
    /// without waiting on any reply.
    ///
    /// Fails only if the connection's writer is gone, which is fatal for the
    /// connection.
    pub fn submit(
        &mut self,
        processor: &CommandProcessor,
        session: &mut SessionState,
        batch: Vec<Command>,
    ) -> Result<(), ProxyError> {
        if self.queue.out.is_closed() {
            return Err(ProxyError::Internal("reply writer is closed".into()));
        }

        for command in batch {
            if self.closing {
                debug!("Ignoring '{}' sent after QUIT.", command.name());
                continue;
            }

            let too_busy = self.queue.pending() >= self.max_pending;
            let filler = SlotFiller {
                queue: self.queue.clone(),
                seq: self.queue.reserve(),
                filled: false,
            };
            if too_busy {
                filler.fill(ProxyError::TooBusy.into());
                continue;
            }

            let seq = filler.seq;
            let name = command.name().to_string();
            match catch_unwind(AssertUnwindSafe(|| processor.process(session, command))) {
                Ok(Dispatch::Ready(frame)) => filler.fill(frame),
                Ok(Dispatch::Pending(mut future)) => {
                    // The first poll runs here, on the connection's task, so
                    // commands reach their upstream links in submission order.
                    match (&mut future).now_or_never() {
                        Some(frame) => filler.fill(frame),
                        None => {
                            tokio::spawn(async move {
                                let frame = future.await;
                                filler.fill(frame);
                            });
                        }
                    }
                }
                Err(_) => {
                    error!("Processing '{}' panicked.", name);
                    filler.fill(ProxyError::Internal(format!("failed to process '{name}'")).into());
                }
            }

            if session.quit_requested {
                self.closing = true;
                self.queue.close_after(seq);
            }
        }
        Ok(())
    }
}
