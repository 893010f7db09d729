// src/core/protocol/command.rs

//! Defines `Command`, the decoded unit of work handed to the proxy core.

use crate::core::ProxyError;
use crate::core::commands::{self, CommandKind, CommandSpec};
use crate::core::protocol::RespFrame;
use bytes::Bytes;

/// A client command: an ordered list of byte-string arguments, the first of
/// which is the command name. Immutable once parsed; ordering is positional
/// within the batch it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    args: Vec<Bytes>,
    name: String,
    spec: Option<&'static CommandSpec>,
}

impl Command {
    /// Builds a command from its raw arguments. Fails if there is no name.
    pub fn new(args: Vec<Bytes>) -> Result<Self, ProxyError> {
        let first = args
            .first()
            .ok_or_else(|| ProxyError::Protocol("empty command".to_string()))?;
        let name = String::from_utf8_lossy(first).to_ascii_lowercase();
        let spec = commands::lookup(&name);
        Ok(Self { args, name, spec })
    }

    /// Convenience constructor from string slices.
    pub fn from_strs(parts: &[&str]) -> Result<Self, ProxyError> {
        Self::new(
            parts
                .iter()
                .map(|p| Bytes::copy_from_slice(p.as_bytes()))
                .collect(),
        )
    }

    /// Decodes a client frame. Returns `Ok(None)` for an empty multibulk, which
    /// clients may send and which produces no reply.
    pub fn from_frame(frame: RespFrame) -> Result<Option<Self>, ProxyError> {
        let RespFrame::Array(items) = frame else {
            return Err(ProxyError::Protocol(
                "expected a multibulk command".to_string(),
            ));
        };
        if items.is_empty() {
            return Ok(None);
        }
        let args = items
            .into_iter()
            .map(|item| match item {
                RespFrame::BulkString(b) => Ok(b),
                RespFrame::SimpleString(s) => Ok(Bytes::from(s)),
                RespFrame::Integer(i) => Ok(Bytes::from(i.to_string())),
                _ => Err(ProxyError::Protocol(
                    "expected bulk string arguments".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(args).map(Some)
    }

    /// The lowercase command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All arguments, including the command name at index 0.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Bytes> {
        self.args.get(index)
    }

    pub fn argc(&self) -> usize {
        self.args.len()
    }

    /// The static table entry for this command, if the proxy knows it.
    pub fn spec(&self) -> Option<&'static CommandSpec> {
        self.spec
    }

    /// Read/write classification used for replica selection and stats.
    pub fn kind(&self) -> CommandKind {
        self.spec.map(CommandSpec::kind).unwrap_or(CommandKind::Unknown)
    }

    /// The keys this command touches, in argument order.
    pub fn keys(&self) -> Vec<Bytes> {
        self.spec
            .map(|spec| spec.extract_keys(&self.args))
            .unwrap_or_default()
    }

    /// Validates the argument count against the command table.
    pub fn check_arity(&self) -> Result<(), ProxyError> {
        match self.spec {
            Some(spec) => spec.check_arity(self.args.len()),
            None => Ok(()),
        }
    }

    /// Converts the command back into the multibulk frame sent upstream.
    pub fn to_frame(&self) -> RespFrame {
        RespFrame::Array(
            self.args
                .iter()
                .cloned()
                .map(RespFrame::BulkString)
                .collect(),
        )
    }
}

impl From<Command> for RespFrame {
    fn from(cmd: Command) -> Self {
        RespFrame::Array(cmd.args.into_iter().map(RespFrame::BulkString).collect())
    }
}
