// src/core/errors.rs

//! Defines the primary error type for the proxy core.
//!
//! Every variant renders as a RESP error line so that business failures can be
//! surfaced to the client as a reply instead of closing the connection.

use crate::core::protocol::RespFrame;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all failures that can occur while a
/// command travels through the proxy pipeline.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("ERR io error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR Protocol error: {0}")]
    Protocol(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgumentCount(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR command '{0}' is not supported by the proxy")]
    UnsupportedCommand(String),

    #[error("NOAUTH Authentication required.")]
    AuthRequired,

    #[error("WRONGPASS invalid username-password pair or user is disabled.")]
    InvalidPassword,

    #[error("ERR Client sent AUTH, but no password is set")]
    NoPasswordSet,

    #[error("ERR auth provider error: {0}")]
    AuthProvider(String),

    #[error("ERR connection is already bound to tenant {0}")]
    TenantRebind(String),

    #[error("ERR no route configured for tenant {0}")]
    NoRoute(String),

    #[error("ERR invalid route: {0}")]
    InvalidRoute(String),

    #[error("CROSSSLOT Keys in request don't hash to the same slot")]
    CrossSlot,

    #[error("ERR upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("ERR upstream timeout")]
    UpstreamTimeout,

    #[error("ERR TOO BUSY")]
    TooBusy,

    #[error("ERR command denied: {0}")]
    CommandDenied(String),

    #[error("ERR max number of clients reached")]
    MaxClientsReached,

    #[error("ERR internal error: {0}")]
    Internal(String),

    #[error("ERR config error: {0}")]
    Config(String),
}

// `std::io::Error` is not cloneable, so it is shared behind an Arc.
impl Clone for ProxyError {
    fn clone(&self) -> Self {
        match self {
            ProxyError::Io(e) => ProxyError::Io(Arc::clone(e)),
            ProxyError::IncompleteData => ProxyError::IncompleteData,
            ProxyError::SyntaxError => ProxyError::SyntaxError,
            ProxyError::Protocol(s) => ProxyError::Protocol(s.clone()),
            ProxyError::WrongArgumentCount(s) => ProxyError::WrongArgumentCount(s.clone()),
            ProxyError::UnknownCommand(s) => ProxyError::UnknownCommand(s.clone()),
            ProxyError::UnsupportedCommand(s) => ProxyError::UnsupportedCommand(s.clone()),
            ProxyError::AuthRequired => ProxyError::AuthRequired,
            ProxyError::InvalidPassword => ProxyError::InvalidPassword,
            ProxyError::NoPasswordSet => ProxyError::NoPasswordSet,
            ProxyError::AuthProvider(s) => ProxyError::AuthProvider(s.clone()),
            ProxyError::TenantRebind(s) => ProxyError::TenantRebind(s.clone()),
            ProxyError::NoRoute(s) => ProxyError::NoRoute(s.clone()),
            ProxyError::InvalidRoute(s) => ProxyError::InvalidRoute(s.clone()),
            ProxyError::CrossSlot => ProxyError::CrossSlot,
            ProxyError::UpstreamUnavailable(s) => ProxyError::UpstreamUnavailable(s.clone()),
            ProxyError::UpstreamTimeout => ProxyError::UpstreamTimeout,
            ProxyError::TooBusy => ProxyError::TooBusy,
            ProxyError::CommandDenied(s) => ProxyError::CommandDenied(s.clone()),
            ProxyError::MaxClientsReached => ProxyError::MaxClientsReached,
            ProxyError::Internal(s) => ProxyError::Internal(s.clone()),
            ProxyError::Config(s) => ProxyError::Config(s.clone()),
        }
    }
}

impl PartialEq for ProxyError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ProxyError::Io(e1), ProxyError::Io(e2)) => e1.kind() == e2.kind(),
            _ => {
                core::mem::discriminant(self) == core::mem::discriminant(other)
                    && self.to_string() == other.to_string()
            }
        }
    }
}

impl ProxyError {
    /// Returns true for errors that mean the client connection can no longer be
    /// used. Everything else is reported to the client as an error reply.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, ProxyError::Io(_) | ProxyError::Protocol(_))
    }
}

impl From<ProxyError> for RespFrame {
    fn from(e: ProxyError) -> Self {
        RespFrame::Error(e.to_string())
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for ProxyError {
    fn from(e: std::io::Error) -> Self {
        ProxyError::Io(Arc::new(e))
    }
}

impl From<std::str::Utf8Error> for ProxyError {
    fn from(_: std::str::Utf8Error) -> Self {
        ProxyError::SyntaxError
    }
}

impl From<std::num::ParseIntError> for ProxyError {
    fn from(_: std::num::ParseIntError) -> Self {
        ProxyError::SyntaxError
    }
}

impl From<tokio::time::error::Elapsed> for ProxyError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProxyError::UpstreamTimeout
    }
}
