// messenger/src/main.rs

//! Messenger node binary.
//!
//! Wires up the full node from the library pieces:
//!
//! - a fresh signing + key-agreement identity,
//! - the ledger and sync stack behind the [`Network`] façade,
//! - UDP peer discovery with auto-connect,
//! - a periodic chain-sync pass,
//! - a Prometheus metrics exporter on `/metrics`,
//! - and Ctrl-C shutdown.
//!
//! Configuration comes from defaults plus `MESSENGER_*` environment
//! variables (see `config.rs`).

use std::sync::Arc;

use tokio::signal;

use messenger::config::NodeConfig;
use messenger::metrics::{MetricsRegistry, run_prometheus_http_server};
use messenger::{LoggingBridge, Network, NodeIdentity};

#[tokio::main]
async fn main() {
    // Basic tracing setup.
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "messenger=info,chain=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cfg = NodeConfig::from_env();

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::error!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Identity
    // ---------------------------

    tracing::info!(username = %cfg.username, "generating keys");
    let identity = NodeIdentity::generate(cfg.username.clone());
    tracing::info!(
        public_key = %hex::encode(identity.agreement_public_key()),
        "node address"
    );

    // ---------------------------
    // Network façade
    // ---------------------------

    let network = Network::new(
        cfg.clone(),
        identity,
        Arc::new(LoggingBridge),
        metrics.clone(),
    );

    let addr = network
        .start()
        .await
        .map_err(|e| format!("failed to start node on {}:{}: {e}", cfg.network.host, cfg.network.port))?;
    tracing::info!(%addr, "listening for peers");

    network
        .discover_peers()
        .map_err(|e| format!("failed to start discovery on port {}: {e}", cfg.discovery.broadcast_port))?;

    // ---------------------------
    // Periodic chain-sync pass
    // ---------------------------

    let sync_network = network.clone();
    let sync_interval = cfg.sync.sync_interval;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(sync_interval).await;
            sync_network.sync_with_peers().await;
        }
    });

    // ---------------------------
    // Run until Ctrl-C
    // ---------------------------

    shutdown_signal().await;
    network.shutdown();
    Ok(())
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
