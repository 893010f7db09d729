// src/core/commands/mod.rs

//! The proxy's static command table: arity, read/write classification, local
//! handling, and key positions for every command the proxy routes.

mod keys;
mod table;

pub use keys::KeySpec;
pub use table::{COMMAND_TABLE, lookup};

use crate::core::ProxyError;
use bitflags::bitflags;
use bytes::Bytes;
use strum_macros::{AsRefStr, Display};

bitflags! {
    /// Flags that describe how the proxy must treat a command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandFlags: u16 {
        /// The command only reads data and may be served by a replica.
        const READONLY    = 1 << 0;
        /// The command modifies the dataset and must go to a primary.
        const WRITE       = 1 << 1;
        /// The command is answered by the proxy itself.
        const LOCAL       = 1 << 2;
        /// The command needs connection affinity upstream and is refused.
        const UNSUPPORTED = 1 << 3;
        /// Multi-key command that may be split across shards and merged.
        const FANOUT      = 1 << 4;
        /// Keyless command that only makes sense against a single node.
        const NODE_SCOPED = 1 << 5;
    }
}

/// The read/write classification of a command. `Unknown` commands have no
/// declared classification and are always sent to the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum CommandKind {
    Read,
    Write,
    Unknown,
}

/// A single command table entry.
#[derive(Debug, PartialEq)]
pub struct CommandSpec {
    /// The lowercase command name.
    pub name: &'static str,
    /// Positive: exact argument count including the name. Negative: minimum.
    pub arity: i32,
    pub flags: CommandFlags,
    pub keys: KeySpec,
}

impl CommandSpec {
    pub fn kind(&self) -> CommandKind {
        if self.flags.contains(CommandFlags::WRITE) {
            CommandKind::Write
        } else if self.flags.contains(CommandFlags::READONLY) {
            CommandKind::Read
        } else {
            CommandKind::Unknown
        }
    }

    pub fn is_local(&self) -> bool {
        self.flags.contains(CommandFlags::LOCAL)
    }

    pub fn check_arity(&self, argc: usize) -> Result<(), ProxyError> {
        let ok = if self.arity >= 0 {
            argc == self.arity as usize
        } else {
            argc >= self.arity.unsigned_abs() as usize
        };
        if ok {
            Ok(())
        } else {
            Err(ProxyError::WrongArgumentCount(self.name.to_string()))
        }
    }

    pub fn extract_keys(&self, args: &[Bytes]) -> Vec<Bytes> {
        self.keys.extract(args)
    }
}
