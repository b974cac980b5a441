//! Proof-of-work miner and difficulty check.
//!
//! Mining is a cooperative nonce search: increment the nonce, recompute
//! the hash, and stop once the hex digest starts with `difficulty` zero
//! characters. The search reads a stop flag between iterations so a
//! shutting-down node can abandon a long mine.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::Block;

/// Nonce-search miner for a fixed difficulty.
#[derive(Clone, Copy, Debug)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        Self { difficulty }
    }

    /// The required hash prefix: `difficulty` zero hex digits.
    pub fn target(&self) -> String {
        "0".repeat(self.difficulty)
    }

    /// Searches nonces from the block's current value until the hash meets
    /// the target, updating `block.nonce` and `block.hash` in place.
    ///
    /// Returns `false` without touching the result further if `stop` was
    /// raised mid-search; the block is then left partially mined and must
    /// not be used.
    pub fn mine(&self, block: &mut Block, stop: &AtomicBool) -> bool {
        let target = self.target();
        while !block.hash.starts_with(&target) {
            if stop.load(Ordering::Relaxed) {
                tracing::debug!(index = block.index, "mining interrupted");
                return false;
            }
            block.nonce += 1;
            block.hash = block.calculate_hash();
        }
        tracing::debug!(index = block.index, hash = %block.hash, "block mined");
        true
    }

    /// True if the block's stored hash meets the difficulty target.
    pub fn validate(&self, block: &Block) -> bool {
        block.hash.starts_with(&self.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unstopped() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn target_is_difficulty_zeros() {
        assert_eq!(ProofOfWork::new(0).target(), "");
        assert_eq!(ProofOfWork::new(4).target(), "0000");
    }

    #[test]
    fn mining_meets_the_target_and_keeps_content_hash() {
        let pow = ProofOfWork::new(2);
        let mut block = Block::new(1, "00ab", 1.0, Vec::new());

        assert!(pow.mine(&mut block, &unstopped()));
        assert!(block.hash.starts_with("00"));
        assert_eq!(block.hash, block.calculate_hash());
        assert!(pow.validate(&block));
    }

    #[test]
    fn validate_rejects_unmined_blocks() {
        let pow = ProofOfWork::new(2);
        // A fresh hash almost never starts with "00"; force one that doesn't.
        let mut block = Block::new(1, "00ab", 1.0, Vec::new());
        while block.hash.starts_with("00") {
            block.timestamp += 1.0;
            block.hash = block.calculate_hash();
        }
        assert!(!pow.validate(&block));
    }

    #[test]
    fn raised_stop_flag_abandons_the_search() {
        let pow = ProofOfWork::new(64);
        let mut block = Block::new(1, "00ab", 1.0, Vec::new());
        let stop = AtomicBool::new(true);

        assert!(!pow.mine(&mut block, &stop));
    }
}
