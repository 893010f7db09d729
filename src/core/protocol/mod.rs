// src/core/protocol/mod.rs

//! RESP wire types shared by the client-facing and upstream-facing sides.

pub mod command;
pub mod resp_frame;

pub use command::Command;
pub use resp_frame::{RespFrame, RespFrameCodec};
