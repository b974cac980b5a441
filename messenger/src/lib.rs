//! Messenger node library.
//!
//! This crate provides the networking half of the peer-to-peer
//! messenger, built on top of the `chain` ledger crate:
//!
//! - node configuration (`config`) and identity (`identity`),
//! - UDP broadcast peer discovery, framed TCP gossip, the sync manager,
//!   and the P2P façade (`net`),
//! - the host-application bridge (`bridge`),
//! - Prometheus-based metrics (`metrics`).
//!
//! The `messenger` binary wires these pieces into an autonomous node;
//! a chat UI embeds [`Network`] and implements [`HostBridge`] instead.

pub mod bridge;
pub mod config;
pub mod identity;
pub mod metrics;
pub mod net;

// Re-export the surface a host application embeds.
pub use bridge::{HostBridge, LoggingBridge};
pub use config::NodeConfig;
pub use identity::NodeIdentity;
pub use metrics::{MetricsRegistry, NodeMetrics, run_prometheus_http_server};
pub use net::p2p::Network;
pub use net::{NetworkError, Peer};
