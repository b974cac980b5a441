//! Networking layer of the node.
//!
//! - `frame`: tagged, zlib-compressed application messages,
//! - `transport`: the framed TCP listener, connection list, and reader
//!   loops,
//! - `discovery`: UDP broadcast peer discovery,
//! - `sync`: the frame handlers that keep ledgers converging,
//! - `p2p`: the façade tying identity, ledger, transport, and sync
//!   together.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

pub mod discovery;
pub mod frame;
pub mod p2p;
pub mod sync;
pub mod transport;

/// Identifier of one live connection in the transport's list.
pub type ConnId = u64;

/// Another node on the network, as learned through discovery.
///
/// Peers are deduplicated by full tuple equality; the same host re-announcing
/// itself under a new key or username counts as a new peer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Peer {
    pub host: IpAddr,
    pub port: u16,
    pub username: String,
    /// The peer's key-agreement public value, also its chain address.
    pub public_key: Vec<u8>,
}

/// The shared, deduplicated set of known peers.
pub type PeerSet = Arc<Mutex<HashSet<Peer>>>;

/// Errors surfaced by the networking layer.
#[derive(Debug)]
pub enum NetworkError {
    /// Refused to open a connection to our own listener.
    SelfConnection,
    /// The connection list is at `max_connections`.
    ConnectionCap,
    /// Transient socket failure.
    Socket(std::io::Error),
    /// No discovered peer carries the requested username.
    UnknownPeer(String),
    /// Key derivation or message encryption failed.
    Crypto(chain::CryptoError),
    /// The outgoing transaction failed local admission.
    Transaction(chain::TransactionError),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::SelfConnection => write!(f, "cannot connect to self"),
            NetworkError::ConnectionCap => write!(f, "maximum connections reached"),
            NetworkError::Socket(e) => write!(f, "socket error: {e}"),
            NetworkError::UnknownPeer(username) => write!(f, "no peer named {username}"),
            NetworkError::Crypto(e) => write!(f, "{e}"),
            NetworkError::Transaction(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for NetworkError {}

impl From<std::io::Error> for NetworkError {
    fn from(e: std::io::Error) -> Self {
        NetworkError::Socket(e)
    }
}

impl From<chain::CryptoError> for NetworkError {
    fn from(e: chain::CryptoError) -> Self {
        NetworkError::Crypto(e)
    }
}

impl From<chain::TransactionError> for NetworkError {
    fn from(e: chain::TransactionError) -> Self {
        NetworkError::Transaction(e)
    }
}
