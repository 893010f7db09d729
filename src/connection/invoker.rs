// src/connection/invoker.rs

//! The entry point from a connection's read loop into the proxy core.

use super::session::SessionState;
use crate::core::ProxyError;
use crate::core::processor::CommandProcessor;
use crate::core::protocol::Command;
use crate::core::transponder::{OutboundSender, Transponder};

/// Everything the core keeps per connection. Owned by the connection's task
/// and handed to the invoker explicitly on every batch.
#[derive(Debug)]
pub struct ConnectionContext {
    pub session: SessionState,
    out: OutboundSender,
    max_pending: usize,
    transponder: Option<Transponder>,
}

impl ConnectionContext {
    pub fn new(session: SessionState, out: OutboundSender, max_pending: usize) -> Self {
        Self {
            session,
            out,
            max_pending,
            transponder: None,
        }
    }

    /// The transponder, if a batch has been seen yet.
    pub fn transponder(&self) -> Option<&Transponder> {
        self.transponder.as_ref()
    }

    /// True once the connection accepted a `QUIT`.
    pub fn is_closing(&self) -> bool {
        self.transponder.as_ref().is_some_and(Transponder::is_closing)
    }
}

/// Forwards decoded batches to each connection's transponder.
#[derive(Debug, Clone)]
pub struct Invoker {
    processor: CommandProcessor,
}

impl Invoker {
    pub fn new(processor: CommandProcessor) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &CommandProcessor {
        &self.processor
    }

    /// Dispatches `batch` on `ctx`'s connection.
    ///
    /// Per-command failures become error replies inside the transponder. An
    /// `Err` here means the connection itself is unusable and must be closed.
    pub fn invoke(&self, ctx: &mut ConnectionContext, batch: Vec<Command>) -> Result<(), ProxyError> {
        if batch.is_empty() {
            return Ok(());
        }
        let transponder = ctx
            .transponder
            .get_or_insert_with(|| Transponder::new(ctx.out.clone(), ctx.max_pending));
        self.processor
            .state()
            .clients
            .touch(ctx.session.client_id);
        transponder.submit(&self.processor, &mut ctx.session, batch)
    }
}
