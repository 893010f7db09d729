// src/core/state/mod.rs

//! Defines the central `ProxyState` struct and all related state components.

mod client;
mod core;
mod stats;

pub use client::{ClientInfo, ClientRegistry, ShutdownSender};
pub use core::{LogReloadHandle, ProxyState};
pub use stats::ProxyStats;
