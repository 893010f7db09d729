// src/main.rs

//! The main entry point for the SpinelProxy application.

use anyhow::Result;
use spinelproxy::config::Config;
use spinelproxy::server;
use std::env;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--version") {
        println!("SpinelProxy version {VERSION}");
        return Ok(());
    }

    // An explicit --config must exist; the default path is optional and the
    // proxy falls back to built-in defaults without it.
    let explicit_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .cloned();
    let (mut config, config_path) = match explicit_path {
        Some(path) => match Config::from_file(&path) {
            Ok(cfg) => (cfg, Some(path)),
            Err(e) => {
                eprintln!("Failed to load configuration from \"{path}\": {e}");
                std::process::exit(1);
            }
        },
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
            match Config::from_file(DEFAULT_CONFIG_PATH) {
                Ok(cfg) => (cfg, Some(DEFAULT_CONFIG_PATH.to_string())),
                Err(e) => {
                    eprintln!("Failed to load configuration from \"{DEFAULT_CONFIG_PATH}\": {e}");
                    std::process::exit(1);
                }
            }
        }
        None => (Config::default(), None),
    };

    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        match args.get(port_index + 1).map(|s| s.parse::<u16>()) {
            Some(Ok(port)) => config.port = port,
            Some(Err(_)) => {
                eprintln!("Invalid port number: {}", args[port_index + 1]);
                std::process::exit(1);
            }
            None => {
                eprintln!("--port flag requires a value");
                std::process::exit(1);
            }
        }
    }

    // RUST_LOG wins over the configured level at startup; a config reload
    // replaces the filter with the file's level.
    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    if let Err(e) = server::run(config, config_path, Arc::new(reload_handle)).await {
        error!("Proxy runtime error: {}", e);
        return Err(e);
    }
    Ok(())
}
