// src/server/mod.rs

use crate::config::Config;
use crate::core::state::LogReloadHandle;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;
mod stream;

pub use stream::ClientStream;

/// The main proxy startup function, orchestrating all setup phases.
pub async fn run(
    config: Config,
    config_path: Option<String>,
    log_reload_handle: LogReloadHandle,
) -> Result<()> {
    // 1. Initialize proxy state, listener, TLS, etc.
    let mut server_context =
        initialization::setup(config, config_path, log_reload_handle).await?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut server_context).await?;

    // 3. Accept connections until shutdown.
    connection_loop::run(server_context).await
}
