//! UDP broadcast peer discovery.
//!
//! Every node periodically broadcasts a small advert (host, port,
//! username, agreement public key) as zlib-compressed JSON, and listens
//! on the same socket for adverts from others. Decoded peers are keyed
//! by the full tuple; the node's own advert is dropped on reception, so
//! the peer set never contains the local identity.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::config::DiscoveryConfig;

use super::frame::{DecodeError, deflate, inflate};
use super::{Peer, PeerSet};

/// Maximum accepted advert datagram size.
const MAX_DATAGRAM: usize = 4096;

/// The advert every node broadcasts about itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerAdvert {
    pub host: String,
    pub port: u16,
    /// Hex-encoded key-agreement public value.
    pub public_key: String,
    pub username: String,
}

impl PeerAdvert {
    /// Builds the advert for the local identity tuple.
    pub fn for_local(peer: &Peer) -> Self {
        Self {
            host: peer.host.to_string(),
            port: peer.port,
            public_key: hex::encode(&peer.public_key),
            username: peer.username.clone(),
        }
    }

    /// Serializes and compresses the advert for broadcasting.
    pub fn encode(&self) -> Vec<u8> {
        let json = serde_json::to_vec(self).expect("adverts serialize to JSON");
        deflate(&json)
    }
}

/// Decodes one received datagram into a peer tuple.
///
/// The peer's host is taken from the datagram's source address, not from
/// the advertised host string. Returns `Ok(None)` when the decoded tuple
/// equals the local identity.
pub fn decode_datagram(
    data: &[u8],
    source: IpAddr,
    local: &Peer,
) -> Result<Option<Peer>, DecodeError> {
    let json = inflate(data)?;
    let advert: PeerAdvert = serde_json::from_slice(&json).map_err(DecodeError::Json)?;
    let public_key = hex::decode(&advert.public_key)
        .map_err(|e| DecodeError::Json(serde::de::Error::custom(e)))?;

    let peer = Peer {
        host: source,
        port: advert.port,
        username: advert.username,
        public_key,
    };

    if peer == *local {
        tracing::debug!(username = %peer.username, "ignoring self broadcast");
        return Ok(None);
    }
    Ok(Some(peer))
}

/// Binds the shared discovery socket with reuse and broadcast enabled.
///
/// On POSIX the socket binds to the wildcard address so several nodes on
/// one machine can share the broadcast port; elsewhere it binds to the
/// local host address.
fn bind_broadcast_socket(host: IpAddr, port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;

    let bind_ip: Ipv4Addr = if cfg!(unix) {
        Ipv4Addr::UNSPECIFIED
    } else {
        match host {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        }
    };
    let addr = SocketAddr::new(IpAddr::V4(bind_ip), port);
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}

/// Starts the discovery listener and broadcaster tasks.
///
/// Both tasks share one socket. Discovered peers are inserted into
/// `peers` and also emitted on `events` so the façade can react (update
/// the bridge, dial the peer). The tasks run until the process exits.
pub fn spawn_discovery(
    config: &DiscoveryConfig,
    local: Peer,
    peers: PeerSet,
    events: mpsc::Sender<Peer>,
) -> std::io::Result<()> {
    let socket = Arc::new(bind_broadcast_socket(local.host, config.broadcast_port)?);
    tracing::debug!(port = config.broadcast_port, "listening for broadcasts");

    let advert = PeerAdvert::for_local(&local).encode();
    let broadcast_addr = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::BROADCAST),
        config.broadcast_port,
    );
    let interval = config.broadcast_interval;

    let listener_socket = Arc::clone(&socket);
    tokio::spawn(async move {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            match listener_socket.recv_from(&mut buf).await {
                Ok((len, addr)) => match decode_datagram(&buf[..len], addr.ip(), &local) {
                    Ok(Some(peer)) => {
                        let inserted = peers.lock().await.insert(peer.clone());
                        if inserted {
                            tracing::info!(
                                username = %peer.username,
                                host = %peer.host,
                                port = peer.port,
                                "discovered new peer"
                            );
                            if events.send(peer).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::error!(%addr, %err, "error decoding broadcast message");
                    }
                },
                Err(err) => {
                    tracing::error!(%err, "error receiving broadcast");
                    return;
                }
            }
        }
    });

    tokio::spawn(async move {
        loop {
            if let Err(err) = socket.send_to(&advert, broadcast_addr).await {
                tracing::error!(%err, "error sending broadcast");
            }
            tokio::time::sleep(interval).await;
        }
    });

    Ok(())
}
