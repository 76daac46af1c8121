//! Registrar daemon entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;
use tokio::sync::mpsc;

mod bridge;
mod config;
mod error;
mod host;
mod metadata;
mod ports;
mod registry;
mod retry;
mod runtime;
mod service;
mod types;

use bridge::{run_bridge, RegistryBridge};
use config::Config;
use host::HostIdentity;
use registry::{run_publisher, Catalog, ChannelRegistry};
use runtime::{ContainerRuntime, DockerRuntime};
use service::ServiceFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting registrar with config: {:?}", cfg);

    let host = HostIdentity::detect().await;
    let factory = ServiceFactory::new(host)
        .with_host_ip(cfg.host_ip.clone())
        .with_prefix(cfg.metadata_prefix.clone());

    // Channels: runtime -> bridge, registry -> publisher
    let (event_tx, event_rx) = mpsc::channel(128);
    let (update_tx, update_rx) = mpsc::channel(128);

    let runtime = DockerRuntime::connect(cfg.resync)?;
    let bridge = Arc::new(RegistryBridge::new(
        runtime.clone(),
        ChannelRegistry::new(update_tx),
        factory,
        cfg.port_policy(),
        cfg.retry_policy(),
    ));

    // Registry publisher
    let catalog = Catalog::default();
    let publisher_catalog = Arc::clone(&catalog);
    let publisher_handle = tokio::spawn(async move {
        if let Err(e) = run_publisher(update_rx, publisher_catalog, tokio::io::stdout()).await {
            error!("Publisher failed: {}", e);
        }
    });

    // Bridge
    let bridge_for_events = Arc::clone(&bridge);
    let bridge_handle = tokio::spawn(async move {
        if let Err(e) = run_bridge(event_rx, bridge_for_events).await {
            error!("Bridge failed: {}", e);
        }
    });

    // Container Runtime (Docker)
    let runtime_handle = tokio::spawn(async move {
        if let Err(e) = runtime.monitor(event_tx).await {
            error!("Container runtime failed: {}", e);
        }
    });

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    // Abort tasks
    runtime_handle.abort();
    bridge_handle.abort();
    publisher_handle.abort();

    info!(
        "Shutdown complete. {} containers tracked, {} services published.",
        bridge.container_count().await,
        catalog.read().await.len()
    );
    Ok(())
}
