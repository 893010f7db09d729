// src/connection/mod.rs

//! Manages the lifecycle of a single client connection: reading and batching
//! commands, handing them to the invoker, and writing replies in order.

mod guard;
mod handler;
mod invoker;
mod session;

pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use invoker::{ConnectionContext, Invoker};
pub use session::SessionState;
