//! Frame handlers that keep peer ledgers converging.
//!
//! The sync manager consumes decoded frames from the transport channel
//! and applies the gossip rules: validate-and-append for blocks and
//! transactions with rebroadcast on first sight, full-chain replies to
//! `REQUEST_CHAIN`, and the longest-valid-chain rule for received
//! chains. Mining runs on its own task fed by a block-build request
//! channel, so a long nonce search never stalls a connection's reader.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};

use chain::{Block, BlockAdmission, Ledger, ProofOfWork, Transaction, TxAdmission};

use crate::bridge::HostBridge;
use crate::metrics::MetricsRegistry;

use super::frame::Frame;
use super::transport::{Broadcaster, InboundFrame};
use super::ConnId;

/// Gossip and reconciliation logic shared by all connections.
pub struct SyncManager {
    ledger: Arc<Mutex<Ledger>>,
    broadcaster: Arc<dyn Broadcaster>,
    bridge: Arc<dyn HostBridge>,
    metrics: Arc<MetricsRegistry>,
    /// The local agreement key: reward recipient and message address.
    local_address: Vec<u8>,
    mining_threshold: usize,
    pow: ProofOfWork,
    mine_requests: mpsc::Sender<()>,
    stop: Arc<AtomicBool>,
}

impl SyncManager {
    /// Builds the manager plus the receiver its miner task consumes.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<Mutex<Ledger>>,
        broadcaster: Arc<dyn Broadcaster>,
        bridge: Arc<dyn HostBridge>,
        metrics: Arc<MetricsRegistry>,
        local_address: Vec<u8>,
        mining_threshold: usize,
        pow: ProofOfWork,
        stop: Arc<AtomicBool>,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        // Capacity 1 coalesces bursts: one pending request mines the
        // whole mempool regardless of how many frames tripped it.
        let (mine_requests, mine_rx) = mpsc::channel(1);
        let manager = Arc::new(Self {
            ledger,
            broadcaster,
            bridge,
            metrics,
            local_address,
            mining_threshold,
            pow,
            mine_requests,
            stop,
        });
        (manager, mine_rx)
    }

    /// Dispatch loop over frames delivered by the transport.
    pub async fn run_frames(self: Arc<Self>, mut frames: mpsc::Receiver<InboundFrame>) {
        while let Some(frame) = frames.recv().await {
            self.metrics.node.frames_received.inc();
            self.handle_frame(&frame.payload, Some(frame.from)).await;
        }
    }

    /// Handles one decompressed frame from connection `from`.
    pub async fn handle_frame(&self, payload: &[u8], from: Option<ConnId>) {
        match Frame::decode(payload) {
            Ok(Frame::NewBlock(block)) => self.handle_new_block(block, from).await,
            Ok(Frame::NewTransaction(tx)) => self.handle_new_transaction(tx, from).await,
            Ok(Frame::RequestChain) => self.broadcast_chain().await,
            Ok(Frame::Blockchain(blocks)) => self.handle_blockchain(blocks).await,
            Ok(Frame::NewMessage) => {}
            Ok(Frame::Other(raw)) => {
                // Opaque payloads are relayed to everyone but the sender.
                self.broadcaster.broadcast(&raw, from).await;
            }
            Err(err) => {
                tracing::warn!(%err, "dropping undecodable frame");
            }
        }
    }

    /// Runs the dedicated miner until the node shuts down.
    ///
    /// Each request mines whatever the mempool holds at that moment and
    /// gossips the result: the block as `NEW_BLOCK`, the reward as a
    /// regular `NEW_TRANSACTION`.
    pub async fn run_miner(self: Arc<Self>, mut requests: mpsc::Receiver<()>) {
        while requests.recv().await.is_some() {
            let started = Instant::now();
            let mined = {
                let mut ledger = self.ledger.lock().await;
                ledger.mine_pending(&self.pow, &self.local_address, &self.stop)
            };

            let Some((block, reward)) = mined else {
                continue;
            };
            self.metrics
                .node
                .mine_seconds
                .observe(started.elapsed().as_secs_f64());
            self.metrics.node.blocks_appended.inc();
            tracing::info!(index = block.index, hash = %block.hash, "mined block");

            self.broadcaster
                .broadcast(&Frame::NewBlock(block.clone()).encode(), None)
                .await;
            self.broadcaster
                .broadcast(&Frame::NewTransaction(reward).encode(), None)
                .await;
            self.bridge.on_block_appended(&block);
        }
    }

    async fn handle_new_block(&self, block: Block, from: Option<ConnId>) {
        let admission = {
            let mut ledger = self.ledger.lock().await;
            ledger.import_block(block.clone())
        };

        match admission {
            Ok(BlockAdmission::Appended) => {
                self.metrics.node.blocks_appended.inc();
                tracing::info!(index = block.index, "added new block");
                self.broadcaster
                    .broadcast(&Frame::NewBlock(block.clone()).encode(), from)
                    .await;
                self.bridge.on_block_appended(&block);
            }
            Ok(BlockAdmission::AlreadyKnown) => {}
            Err(err) => {
                self.metrics.node.blocks_rejected.inc();
                tracing::warn!(%err, "invalid block received");
            }
        }
    }

    async fn handle_new_transaction(&self, tx: Transaction, from: Option<ConnId>) {
        let (admission, mempool_full) = {
            let mut ledger = self.ledger.lock().await;
            let admission = ledger.add_transaction(tx.clone());
            let mempool_full = ledger.pending().len() >= self.mining_threshold;
            (admission, mempool_full)
        };

        match admission {
            Ok(TxAdmission::Accepted) => {
                self.metrics.node.transactions_accepted.inc();
                tracing::info!(hash = %tx.calculate_hash(), "added new transaction from network");
                self.broadcaster
                    .broadcast(&Frame::NewTransaction(tx.clone()).encode(), from)
                    .await;

                if tx.recipient.as_deref() == Some(self.local_address.as_slice()) {
                    if let Some(sender) = &tx.sender {
                        self.bridge.on_messages(&self.local_address, sender);
                    }
                }

                if mempool_full {
                    // A full channel means a mine is already queued.
                    let _ = self.mine_requests.try_send(());
                }
            }
            Ok(TxAdmission::AlreadyPending) => {}
            Err(err) => {
                self.metrics.node.transactions_rejected.inc();
                tracing::warn!(%err, "invalid transaction received");
            }
        }
    }

    async fn broadcast_chain(&self) {
        let blocks = {
            let ledger = self.ledger.lock().await;
            ledger.blocks().to_vec()
        };
        tracing::debug!(len = blocks.len(), "broadcasting chain");
        self.broadcaster
            .broadcast(&Frame::Blockchain(blocks).encode(), None)
            .await;
    }

    async fn handle_blockchain(&self, blocks: Vec<Block>) {
        let mut ledger = self.ledger.lock().await;
        if ledger.merge_chain(blocks) {
            tracing::info!("local blockchain updated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LoggingBridge;
    use async_trait::async_trait;
    use chain::crypto::Signer as _;
    use chain::Ed25519Signer;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    /// Broadcaster that records every payload it is asked to send.
    #[derive(Default)]
    struct RecordingBroadcaster {
        sent: Mutex<Vec<(Vec<u8>, Option<ConnId>)>>,
    }

    impl RecordingBroadcaster {
        async fn frames(&self) -> Vec<(Frame, Option<ConnId>)> {
            self.sent
                .lock()
                .await
                .iter()
                .map(|(payload, exclude)| (Frame::decode(payload).expect("recorded frames decode"), *exclude))
                .collect()
        }
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        async fn broadcast(&self, payload: &[u8], exclude: Option<ConnId>) {
            self.sent.lock().await.push((payload.to_vec(), exclude));
        }
    }

    struct Harness {
        sync: Arc<SyncManager>,
        ledger: Arc<Mutex<Ledger>>,
        broadcaster: Arc<RecordingBroadcaster>,
    }

    fn harness(difficulty: usize, mining_threshold: usize) -> Harness {
        let ledger = Arc::new(Mutex::new(Ledger::new(difficulty)));
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let metrics = Arc::new(MetricsRegistry::new().expect("metrics registry"));
        let (sync, mine_rx) = SyncManager::new(
            Arc::clone(&ledger),
            broadcaster.clone(),
            Arc::new(LoggingBridge),
            metrics,
            b"local-address".to_vec(),
            mining_threshold,
            ProofOfWork::new(difficulty),
            Arc::new(AtomicBool::new(false)),
        );
        tokio::spawn(Arc::clone(&sync).run_miner(mine_rx));
        Harness {
            sync,
            ledger,
            broadcaster,
        }
    }

    fn signed_tx(signer: &Ed25519Signer, content: &str) -> Transaction {
        let mut tx = Transaction::new(
            Some(b"Alice".to_vec()),
            Some(b"Bob".to_vec()),
            0,
            content,
            Some(signer.public_key()),
        );
        tx.sign(signer).expect("signing succeeds");
        tx
    }

    #[tokio::test]
    async fn accepted_transactions_are_rebroadcast_excluding_the_sender() {
        let h = harness(1, 100);
        let signer = Ed25519Signer::generate();
        let tx = signed_tx(&signer, "hi");

        h.sync
            .handle_frame(&Frame::NewTransaction(tx.clone()).encode(), Some(7))
            .await;

        assert_eq!(h.ledger.lock().await.pending().len(), 1);
        let frames = h.broadcaster.frames().await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], (Frame::NewTransaction(_), Some(7))));

        // A replay changes nothing and is not rebroadcast again.
        h.sync
            .handle_frame(&Frame::NewTransaction(tx).encode(), Some(8))
            .await;
        assert_eq!(h.ledger.lock().await.pending().len(), 1);
        assert_eq!(h.broadcaster.frames().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_transactions_are_dropped() {
        let h = harness(1, 100);
        let forged = Transaction::new(
            Some(b"Mallory".to_vec()),
            Some(b"Bob".to_vec()),
            0,
            "fake",
            None,
        );

        h.sync
            .handle_frame(&Frame::NewTransaction(forged).encode(), Some(7))
            .await;

        assert!(h.ledger.lock().await.pending().is_empty());
        assert!(h.broadcaster.frames().await.is_empty());
    }

    #[tokio::test]
    async fn a_full_mempool_triggers_exactly_one_mined_block() {
        let h = harness(1, 3);
        let signer = Ed25519Signer::generate();

        for i in 0..3 {
            let tx = signed_tx(&signer, &format!("message {i}"));
            h.sync
                .handle_frame(&Frame::NewTransaction(tx).encode(), Some(1))
                .await;
        }

        // Wait for the miner task to publish the block.
        timeout(Duration::from_secs(10), async {
            loop {
                let frames = h.broadcaster.frames().await;
                if frames
                    .iter()
                    .any(|(frame, _)| matches!(frame, Frame::NewBlock(_)))
                {
                    break;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("a block is mined and broadcast");

        let frames = h.broadcaster.frames().await;
        let blocks: Vec<&Frame> = frames
            .iter()
            .map(|(frame, _)| frame)
            .filter(|frame| matches!(frame, Frame::NewBlock(_)))
            .collect();
        assert_eq!(blocks.len(), 1);

        // The reward is gossiped as a regular transaction to everyone.
        assert!(frames
            .iter()
            .any(|(frame, exclude)| matches!(frame, Frame::NewTransaction(tx) if tx.sender.is_none())
                && exclude.is_none()));

        let ledger = h.ledger.lock().await;
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.pending().len(), 1);
        let reward = &ledger.pending()[0];
        assert_eq!(reward.sender, None);
        assert_eq!(reward.recipient, Some(b"local-address".to_vec()));
        assert_eq!(reward.amount, 1);
    }

    #[tokio::test]
    async fn new_blocks_are_imported_once_and_rebroadcast() {
        let h = harness(1, 100);

        // Mine a block in a scratch ledger sharing the same genesis.
        let mut donor = Ledger::new(1);
        donor
            .add_transaction(Transaction::new(None, Some(b"seed".to_vec()), 0, "seed", None))
            .unwrap();
        let (block, _) = donor
            .mine_pending(
                &ProofOfWork::new(1),
                b"Miner1",
                &AtomicBool::new(false),
            )
            .expect("mining succeeds");

        h.sync
            .handle_frame(&Frame::NewBlock(block.clone()).encode(), Some(3))
            .await;
        assert_eq!(h.ledger.lock().await.len(), 2);

        let frames = h.broadcaster.frames().await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], (Frame::NewBlock(_), Some(3))));

        // Receiving the same block again is silent.
        h.sync
            .handle_frame(&Frame::NewBlock(block).encode(), Some(4))
            .await;
        assert_eq!(h.ledger.lock().await.len(), 2);
        assert_eq!(h.broadcaster.frames().await.len(), 1);
    }

    #[tokio::test]
    async fn tampered_blocks_are_dropped() {
        let h = harness(1, 100);
        let tip_hash = h.ledger.lock().await.get_latest_block().hash.clone();
        let mut forged = Block::new(1, tip_hash, 1.0, Vec::new());
        forged.hash = "0".repeat(64);

        h.sync
            .handle_frame(&Frame::NewBlock(forged).encode(), Some(3))
            .await;
        assert_eq!(h.ledger.lock().await.len(), 1);
        assert!(h.broadcaster.frames().await.is_empty());
    }

    #[tokio::test]
    async fn request_chain_is_answered_with_the_full_chain() {
        let h = harness(1, 100);

        h.sync.handle_frame(&Frame::RequestChain.encode(), Some(2)).await;

        let frames = h.broadcaster.frames().await;
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            (Frame::Blockchain(blocks), None) => {
                assert_eq!(blocks.len(), 1);
                assert_eq!(blocks[0], Block::genesis());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn longer_valid_chains_replace_the_local_one() {
        let h = harness(1, 100);

        let mut donor = Ledger::new(1);
        donor
            .add_transaction(Transaction::new(None, Some(b"seed".to_vec()), 0, "seed", None))
            .unwrap();
        for _ in 0..2 {
            donor
                .mine_pending(&ProofOfWork::new(1), b"Miner1", &AtomicBool::new(false))
                .expect("mining succeeds");
        }

        h.sync
            .handle_frame(&Frame::Blockchain(donor.blocks().to_vec()).encode(), Some(5))
            .await;

        let ledger = h.ledger.lock().await;
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.blocks(), donor.blocks());
    }

    #[tokio::test]
    async fn unknown_tags_are_relayed_verbatim() {
        let h = harness(1, 100);
        let payload = b"GOSSIP something opaque".to_vec();

        h.sync.handle_frame(&payload, Some(9)).await;

        let frames = h.broadcaster.sent.lock().await.clone();
        assert_eq!(frames, vec![(payload, Some(9))]);
    }

    #[tokio::test]
    async fn reserved_and_undecodable_frames_are_no_ops() {
        let h = harness(1, 100);

        h.sync.handle_frame(&Frame::NewMessage.encode(), Some(1)).await;

        let mut bad = b"NEW_BLOCK".to_vec();
        bad.extend_from_slice(b"{broken");
        h.sync.handle_frame(&bad, Some(1)).await;

        assert!(h.broadcaster.frames().await.is_empty());
        assert_eq!(h.ledger.lock().await.len(), 1);
    }
}
