// src/core/plugin/mod.rs

//! Middleware around command dispatch. Plugins see every command before it is
//! sent and every reply before it is written back.

pub mod builtin;
pub mod chain;
pub mod registry;

pub use chain::{BeforeOutcome, PluginChain, PluginHandle};
pub use registry::{PluginConfig, PluginRegistry};

use crate::core::ProxyError;
use crate::core::protocol::{Command, RespFrame};
use crate::core::routing::TenantKey;
use std::net::SocketAddr;

/// What a plugin knows about the connection a command came from.
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub client_id: u64,
    pub addr: SocketAddr,
    pub tenant: TenantKey,
}

/// The decision a `before` hook makes.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginAction {
    /// Let the command through unchanged.
    Continue,
    /// Replace the command seen by later plugins and by dispatch.
    Rewrite(Command),
    /// Answer with this reply; later `before` hooks and dispatch are skipped.
    Reply(RespFrame),
}

/// A command middleware. Both hooks are optional.
///
/// An `Err` or a panic from either hook is logged and treated as the plugin
/// declining to act.
pub trait ProxyPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn before(&self, _ctx: &PluginContext, _command: &Command) -> Result<PluginAction, ProxyError> {
        Ok(PluginAction::Continue)
    }

    fn after(
        &self,
        _ctx: &PluginContext,
        _command: &Command,
        _reply: &mut RespFrame,
    ) -> Result<(), ProxyError> {
        Ok(())
    }
}
