//! Host-application bridge.
//!
//! The core never renders anything. When something user-visible happens
//! it calls into a [`HostBridge`] installed at construction; a chat UI
//! implements the trait, while the plain daemon uses [`LoggingBridge`].

use chain::Block;

use crate::net::Peer;

/// Callbacks the core invokes on user-visible events.
///
/// Implementations must not block: they run on the node's async tasks.
pub trait HostBridge: Send + Sync {
    /// A transaction between `local` and `peer` was accepted into the
    /// mempool or confirmed; the conversation view should refresh.
    fn on_messages(&self, local: &[u8], peer: &[u8]);

    /// The set of known peers changed.
    fn on_peers_changed(&self, _peers: &[Peer]) {}

    /// A new block was appended to the local chain.
    fn on_block_appended(&self, _block: &Block) {}
}

/// Bridge for headless runs: every event becomes a log line.
pub struct LoggingBridge;

impl HostBridge for LoggingBridge {
    fn on_messages(&self, local: &[u8], peer: &[u8]) {
        tracing::info!(
            local = %hex::encode(local),
            peer = %hex::encode(peer),
            "conversation updated"
        );
    }

    fn on_peers_changed(&self, peers: &[Peer]) {
        tracing::info!(count = peers.len(), "peer set changed");
    }

    fn on_block_appended(&self, block: &Block) {
        tracing::info!(index = block.index, hash = %block.hash, "block appended");
    }
}
