// src/core/mod.rs

//! The central module containing the proxy pipeline and its shared state.

pub mod auth;
pub mod commands;
pub mod errors;
pub mod info;
pub mod metrics;
pub mod plugin;
pub mod processor;
pub mod protocol;
pub mod routing;
pub mod state;
pub mod tasks;
pub mod transponder;
pub mod upstream;

pub use errors::ProxyError;
