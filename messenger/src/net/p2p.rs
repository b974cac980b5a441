//! P2P network façade.
//!
//! [`Network`] owns the node's moving parts: identity, ledger,
//! transport, sync manager, the discovered peer set, and the shared-key
//! cache. It is the single surface the host application talks to:
//! start the node, dial peers, send encrypted messages, and read
//! conversations back out of the ledger.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, mpsc};

use chain::crypto::CryptoError;
use chain::{Aes256GcmCipher, Cipher as _, Ledger, ProofOfWork, Transaction};

use crate::bridge::HostBridge;
use crate::config::NodeConfig;
use crate::identity::NodeIdentity;
use crate::metrics::MetricsRegistry;

use super::discovery::spawn_discovery;
use super::frame::Frame;
use super::sync::SyncManager;
use super::transport::{Broadcaster, InboundFrame, TcpTransport, bind_listener};
use super::{ConnId, NetworkError, Peer, PeerSet};

/// The node façade: everything the host application needs in one place.
pub struct Network {
    config: NodeConfig,
    identity: Arc<NodeIdentity>,
    ledger: Arc<Mutex<Ledger>>,
    transport: Arc<TcpTransport>,
    sync: Arc<SyncManager>,
    peers: PeerSet,
    /// Lazily derived per-peer symmetric keys; never evicted during a run.
    shared_keys: Mutex<HashMap<Vec<u8>, [u8; 32]>>,
    bridge: Arc<dyn HostBridge>,
    metrics: Arc<MetricsRegistry>,
    stop: Arc<AtomicBool>,
    // Receivers are created at construction and handed to their tasks in
    // `start`.
    frames_rx: StdMutex<Option<mpsc::Receiver<InboundFrame>>>,
    mine_rx: StdMutex<Option<mpsc::Receiver<()>>>,
}

impl Network {
    /// Wires up ledger, transport, and sync for the given identity.
    ///
    /// Nothing runs until [`start`](Self::start) is called.
    pub fn new(
        config: NodeConfig,
        identity: NodeIdentity,
        bridge: Arc<dyn HostBridge>,
        metrics: Arc<MetricsRegistry>,
    ) -> Arc<Self> {
        let identity = Arc::new(identity);
        let ledger = Arc::new(Mutex::new(Ledger::new(config.consensus.difficulty)));
        let stop = Arc::new(AtomicBool::new(false));

        let (frames_tx, frames_rx) = mpsc::channel(64);
        let transport = TcpTransport::new(config.network.max_connections, frames_tx);
        let broadcaster: Arc<dyn Broadcaster> = transport.clone();

        let (sync, mine_rx) = SyncManager::new(
            Arc::clone(&ledger),
            broadcaster,
            Arc::clone(&bridge),
            Arc::clone(&metrics),
            identity.agreement_public_key(),
            config.consensus.mining_threshold,
            ProofOfWork::new(config.consensus.difficulty),
            Arc::clone(&stop),
        );

        Arc::new(Self {
            config,
            identity,
            ledger,
            transport,
            sync,
            peers: Arc::new(Mutex::new(Default::default())),
            shared_keys: Mutex::new(HashMap::new()),
            bridge,
            metrics,
            stop,
            frames_rx: StdMutex::new(Some(frames_rx)),
            mine_rx: StdMutex::new(Some(mine_rx)),
        })
    }

    /// Binds the listener and spawns the accept, dispatch, and miner
    /// tasks. Returns the bound address.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, NetworkError> {
        let listener = bind_listener(
            SocketAddr::new(self.config.network.host, self.config.network.port),
            self.config.network.max_connections,
        )
        .map_err(NetworkError::Socket)?;
        let addr = listener.local_addr().map_err(NetworkError::Socket)?;
        self.transport.start(listener);

        let frames = self
            .frames_rx
            .lock()
            .expect("frame receiver mutex is never poisoned")
            .take();
        if let Some(frames) = frames {
            tokio::spawn(Arc::clone(&self.sync).run_frames(frames));
        }
        let mine = self
            .mine_rx
            .lock()
            .expect("mine receiver mutex is never poisoned")
            .take();
        if let Some(mine) = mine {
            tokio::spawn(Arc::clone(&self.sync).run_miner(mine));
        }

        tracing::info!(%addr, username = %self.identity.username, "node started");
        Ok(addr)
    }

    /// Dials a peer, refusing connections back to this node's own
    /// listener.
    pub async fn connect_to_peer(&self, host: IpAddr, port: u16) -> Result<ConnId, NetworkError> {
        let same_host = host == self.config.network.host || host.is_loopback();
        if same_host && port == self.config.network.port {
            tracing::warn!(%host, port, "refusing connection to self");
            return Err(NetworkError::SelfConnection);
        }
        self.transport.connect_to_peer(host, port).await
    }

    /// Sends a raw frame payload to every connection except `exclude`.
    pub async fn broadcast_message(&self, payload: &[u8], exclude: Option<ConnId>) {
        self.transport.broadcast(payload, exclude).await;
    }

    /// Gossips a transaction to every connection except `exclude`.
    pub async fn broadcast_transaction(&self, tx: &Transaction, exclude: Option<ConnId>) {
        tracing::debug!(hash = %tx.calculate_hash(), "broadcasting transaction");
        self.broadcast_message(&Frame::NewTransaction(tx.clone()).encode(), exclude)
            .await;
    }

    /// Starts discovery and the task reacting to newly found peers.
    pub fn discover_peers(self: &Arc<Self>) -> std::io::Result<()> {
        let local = Peer {
            host: self.config.network.host,
            port: self.config.network.port,
            username: self.identity.username.clone(),
            public_key: self.identity.agreement_public_key(),
        };
        let (events_tx, mut events_rx) = mpsc::channel(32);
        spawn_discovery(
            &self.config.discovery,
            local,
            Arc::clone(&self.peers),
            events_tx,
        )?;

        let network = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(peer) = events_rx.recv().await {
                let snapshot: Vec<Peer> = network.peers.lock().await.iter().cloned().collect();
                network.metrics.node.peers_known.set(snapshot.len() as i64);
                network.bridge.on_peers_changed(&snapshot);

                if network.config.network.auto_connect {
                    network.dial_if_unconnected(&peer).await;
                }
            }
        });
        Ok(())
    }

    /// Runs one sync pass: ask every connected peer for its chain.
    pub async fn sync_with_peers(&self) {
        if self.peers.lock().await.is_empty() {
            tracing::debug!("no peers to sync with");
            return;
        }
        tracing::debug!("requesting chains from peers");
        self.broadcast_message(&Frame::RequestChain.encode(), None)
            .await;
    }

    /// Encrypts `content` for the named peer, admits the signed
    /// transaction locally, and gossips it.
    pub async fn send_message(&self, username: &str, content: &str) -> Result<(), NetworkError> {
        let peer = self
            .peer_by_username(username)
            .await
            .ok_or_else(|| NetworkError::UnknownPeer(username.to_string()))?;

        let key = self.shared_key_for(&peer.public_key).await?;
        let sealed = Aes256GcmCipher::new(&key).encrypt(content.as_bytes())?;

        let mut tx = Transaction::new(
            Some(self.identity.agreement_public_key()),
            Some(peer.public_key.clone()),
            0,
            hex::encode(sealed),
            Some(self.identity.sign_public_key()),
        );
        tx.sign(self.identity.signer())?;

        {
            let mut ledger = self.ledger.lock().await;
            ledger.add_transaction(tx.clone())?;
        }
        self.metrics.node.transactions_accepted.inc();
        self.broadcast_transaction(&tx, None).await;
        self.bridge
            .on_messages(&self.identity.agreement_public_key(), &peer.public_key);
        Ok(())
    }

    /// Decrypts a message transaction this node is party to.
    pub async fn decrypt_content(&self, tx: &Transaction) -> Result<String, NetworkError> {
        let local = self.identity.agreement_public_key();
        let counterpart = if tx.sender.as_deref() == Some(local.as_slice()) {
            tx.recipient.as_ref()
        } else {
            tx.sender.as_ref()
        }
        .ok_or(NetworkError::Crypto(CryptoError::InvalidPublicKey))?;

        let key = self.shared_key_for(counterpart).await?;
        let sealed = hex::decode(&tx.content)
            .map_err(|_| NetworkError::Crypto(CryptoError::MalformedCiphertext))?;
        let plain = Aes256GcmCipher::new(&key).decrypt(&sealed)?;
        String::from_utf8(plain).map_err(|_| NetworkError::Crypto(CryptoError::MalformedCiphertext))
    }

    /// Conversation with the holder of `peer_public`: confirmed plus
    /// pending transactions between the two addresses.
    pub async fn messages_with(&self, peer_public: &[u8]) -> Vec<Transaction> {
        let ledger = self.ledger.lock().await;
        ledger.messages_between(&self.identity.agreement_public_key(), peer_public)
    }

    /// Confirmed balance of this node's address.
    pub async fn balance(&self) -> i64 {
        let ledger = self.ledger.lock().await;
        ledger.get_balance(&self.identity.agreement_public_key())
    }

    /// Snapshot of the discovered peers.
    pub async fn known_peers(&self) -> Vec<Peer> {
        self.peers.lock().await.iter().cloned().collect()
    }

    /// Signals the miner to abandon any in-flight nonce search.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
        tracing::info!("node shutting down");
    }

    async fn peer_by_username(&self, username: &str) -> Option<Peer> {
        self.peers
            .lock()
            .await
            .iter()
            .find(|peer| peer.username == username)
            .cloned()
    }

    async fn shared_key_for(&self, peer_public: &[u8]) -> Result<[u8; 32], NetworkError> {
        let mut cache = self.shared_keys.lock().await;
        if let Some(key) = cache.get(peer_public) {
            return Ok(*key);
        }
        let key = self.identity.shared_secret(peer_public)?;
        cache.insert(peer_public.to_vec(), key);
        Ok(key)
    }

    async fn dial_if_unconnected(&self, peer: &Peer) {
        if self
            .transport
            .connection_for_host(peer.host)
            .await
            .is_some()
        {
            return;
        }
        if let Err(err) = self.connect_to_peer(peer.host, peer.port).await {
            tracing::warn!(host = %peer.host, port = peer.port, %err, "could not dial discovered peer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LoggingBridge;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn test_network(username: &str) -> Arc<Network> {
        let mut config = NodeConfig {
            username: username.to_string(),
            ..NodeConfig::default()
        };
        config.network.host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.network.port = 0;
        config.consensus.difficulty = 1;

        let metrics = Arc::new(MetricsRegistry::new().expect("metrics registry"));
        Network::new(
            config,
            NodeIdentity::generate(username),
            Arc::new(LoggingBridge),
            metrics,
        )
    }

    async fn register_peer(network: &Network, username: &str, addr: SocketAddr, other: &Network) {
        network.peers.lock().await.insert(Peer {
            host: addr.ip(),
            port: addr.port(),
            username: username.to_string(),
            public_key: other.identity.agreement_public_key(),
        });
    }

    #[tokio::test]
    async fn self_connection_is_refused() {
        let network = test_network("alice");
        let _addr = network.start().await.expect("starts");

        let err = network
            .connect_to_peer(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                network.config.network.port,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::SelfConnection));
    }

    #[tokio::test]
    async fn messaging_an_unknown_username_fails() {
        let network = test_network("alice");
        let err = network.send_message("nobody", "hi").await.unwrap_err();
        assert!(matches!(err, NetworkError::UnknownPeer(name) if name == "nobody"));
    }

    #[tokio::test]
    async fn shared_keys_are_cached_and_symmetric() {
        let alice = test_network("alice");
        let bob = test_network("bob");

        let a_key = alice
            .shared_key_for(&bob.identity.agreement_public_key())
            .await
            .expect("derives");
        let again = alice
            .shared_key_for(&bob.identity.agreement_public_key())
            .await
            .expect("cached");
        assert_eq!(a_key, again);
        assert_eq!(alice.shared_keys.lock().await.len(), 1);

        let b_key = bob
            .shared_key_for(&alice.identity.agreement_public_key())
            .await
            .expect("derives");
        assert_eq!(a_key, b_key);
    }

    #[tokio::test]
    async fn an_encrypted_message_reaches_the_recipient() {
        let alice = test_network("alice");
        let bob = test_network("bob");
        let alice_addr = alice.start().await.expect("alice starts");
        let _bob_addr = bob.start().await.expect("bob starts");

        register_peer(&bob, "alice", alice_addr, &alice).await;
        bob.connect_to_peer(alice_addr.ip(), alice_addr.port())
            .await
            .expect("bob dials alice");

        bob.send_message("alice", "hello alice").await.expect("send");

        // Bob sees his own message immediately in the pending set.
        let from_bob = bob
            .messages_with(&alice.identity.agreement_public_key())
            .await;
        assert_eq!(from_bob.len(), 1);
        assert_eq!(
            bob.decrypt_content(&from_bob[0]).await.expect("decrypts"),
            "hello alice"
        );

        // Alice's sync layer admits the gossiped transaction.
        let received = timeout(Duration::from_secs(10), async {
            loop {
                let messages = alice
                    .messages_with(&bob.identity.agreement_public_key())
                    .await;
                if !messages.is_empty() {
                    break messages;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("message arrives at alice");

        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0].sender,
            Some(bob.identity.agreement_public_key())
        );
        assert_eq!(
            alice
                .decrypt_content(&received[0])
                .await
                .expect("alice decrypts"),
            "hello alice"
        );
    }

    #[tokio::test]
    async fn balances_start_at_zero() {
        let network = test_network("alice");
        assert_eq!(network.balance().await, 0);
    }
}
