// src/server/initialization.rs

//! Handles the proxy initialization process, from state setup to binding the
//! listener and loading TLS material.

use super::context::ServerContext;
use crate::config::Config;
use crate::connection::Invoker;
use crate::core::processor::CommandProcessor;
use crate::core::routing::Resource;
use crate::core::state::{LogReloadHandle, ProxyState};
use anyhow::{Result, anyhow};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_rustls::{TlsAcceptor, rustls};
use tracing::{info, warn};

/// Initializes all proxy components before starting the main loop.
pub async fn setup(
    config: Config,
    config_path: Option<String>,
    log_reload_handle: LogReloadHandle,
) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let acceptor = setup_tls(&config).await?;

    let host = config.host.clone();
    let port = config.port;
    let max_clients = config.max_clients;

    let state = ProxyState::initialize(config, config_path, Some(log_reload_handle))?;
    info!("Proxy state initialized.");

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!("SpinelProxy listening on {}:{}", host, port);

    Ok(ServerContext {
        invoker: Invoker::new(CommandProcessor::new(state.clone())),
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        acceptor,
        connection_permits: Arc::new(Semaphore::new(max_clients)),
    })
}

/// Sets up the TLS acceptor if TLS is enabled in the configuration.
async fn setup_tls(config: &Config) -> Result<Option<TlsAcceptor>> {
    if config.tls.enabled {
        info!("TLS is enabled. Loading certificate and key.");
        let certs = load_certs(&config.tls.cert_path)?;
        let key = load_key(&config.tls.key_path)?;
        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
    } else {
        Ok(None)
    }
}

/// Loads TLS certificates from a PEM file.
fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let cert_file = File::open(path)
        .map_err(|e| anyhow!("Failed to open certificate file '{}': {}", path, e))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(anyhow!("No certificates found in '{}'", path));
    }
    Ok(certs)
}

/// Loads a private key from a PEM file.
fn load_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let key_file = File::open(path)
        .map_err(|e| anyhow!("Failed to open private key file '{}': {}", path, e))?;
    let mut key_reader = BufReader::new(key_file);
    rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| anyhow!("No private key found in key file '{}'", path))
}

/// Logs the shape of the routing configuration at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Proxy configured with {} route(s), {} plugin(s), auth {}.",
        config.routes.len(),
        config.plugins.iter().filter(|p| p.enabled).count(),
        if config.auth.is_required() { "required" } else { "disabled" }
    );
    for route in &config.routes {
        let addrs: Vec<String> = route.resource.addrs().iter().map(|a| a.masked()).collect();
        info!(
            "Route for tenant {}: {} {:?}",
            route.tenant(),
            route.resource,
            addrs
        );
    }
    if !config.routes.iter().any(|r| r.tenant().is_default()) {
        warn!("No default route configured: tenants without their own route will get errors.");
    }
    if config
        .routes
        .iter()
        .any(|r| matches!(r.resource, Resource::Sentinel { .. }))
        && config.sentinel_masters.is_empty()
    {
        warn!("Sentinel routes are configured but no [[sentinel_masters]] are known.");
    }
}
