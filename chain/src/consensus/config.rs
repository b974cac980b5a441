/// Consensus configuration parameters.
///
/// This covers both the proof-of-work tuning (difficulty) and the local
/// policy knob for when a full-enough mempool triggers mining.
#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    /// Number of leading zero hex digits a block hash must carry.
    pub difficulty: usize,
    /// Mempool size at which the node mines a block on its own.
    pub mining_threshold: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            difficulty: 4,
            mining_threshold: 3,
        }
    }
}
