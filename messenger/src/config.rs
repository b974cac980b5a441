//! Node configuration.
//!
//! This module aggregates configuration for:
//!
//! - the TCP listener and connection cap (`NetworkConfig`),
//! - UDP peer discovery (`DiscoveryConfig`),
//! - the periodic chain-sync pass (`SyncConfig`),
//! - the metrics exporter (`MetricsConfig`),
//! - and the consensus knobs re-used from the chain crate.
//!
//! The goal is a single `NodeConfig` that `main.rs` can build from
//! defaults and a handful of environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use chain::ConsensusConfig;

/// Configuration for the framed TCP transport.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    /// Address the node advertises and binds its listener to.
    pub host: IpAddr,
    /// TCP port for peer connections.
    pub port: u16,
    /// Hard cap on simultaneously open peer connections.
    pub max_connections: usize,
    /// Whether to dial peers as soon as discovery reports them.
    pub auto_connect: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5555,
            max_connections: 5,
            auto_connect: true,
        }
    }
}

/// Configuration for UDP peer discovery.
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// Port the advert datagrams are broadcast to and received on.
    pub broadcast_port: u16,
    /// Delay between consecutive adverts.
    pub broadcast_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            broadcast_port: 5556,
            broadcast_interval: Duration::from_secs(1),
        }
    }
}

/// Configuration for the periodic chain-sync pass.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Delay between `REQUEST_CHAIN` passes.
    pub sync_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(5),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for a messenger node.
#[derive(Clone, Debug, Default)]
pub struct NodeConfig {
    /// Username advertised to peers.
    pub username: String,
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub sync: SyncConfig,
    pub consensus: ConsensusConfig,
    pub metrics: MetricsConfig,
}

impl NodeConfig {
    /// Builds a configuration from defaults plus environment overrides.
    ///
    /// Recognised variables: `MESSENGER_USERNAME`, `MESSENGER_HOST`,
    /// `MESSENGER_PORT`, `MESSENGER_BROADCAST_PORT`,
    /// `MESSENGER_DIFFICULTY`, `MESSENGER_MAX_CONNECTIONS`. Unset or
    /// unparsable values fall back to the defaults; the host falls back
    /// to the autodetected LAN address.
    pub fn from_env() -> Self {
        let mut cfg = Self {
            username: std::env::var("MESSENGER_USERNAME").unwrap_or_else(|_| "guest".to_string()),
            ..Self::default()
        };

        cfg.network.host = std::env::var("MESSENGER_HOST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(local_ip);
        if let Some(port) = env_parse("MESSENGER_PORT") {
            cfg.network.port = port;
        }
        if let Some(port) = env_parse("MESSENGER_BROADCAST_PORT") {
            cfg.discovery.broadcast_port = port;
        }
        if let Some(difficulty) = env_parse("MESSENGER_DIFFICULTY") {
            cfg.consensus.difficulty = difficulty;
        }
        if let Some(cap) = env_parse("MESSENGER_MAX_CONNECTIONS") {
            cfg.network.max_connections = cap;
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Best-effort detection of the LAN-facing local address.
///
/// Connecting a UDP socket to a routable address never sends a packet
/// but forces the OS to pick the outgoing interface; its address is the
/// one peers can reach. Falls back to loopback.
pub fn local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("10.254.254.254:1")?;
        Ok(socket.local_addr()?.ip())
    };
    probe().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
