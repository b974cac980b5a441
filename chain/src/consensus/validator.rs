//! Structural block and chain validity checks.
//!
//! The validator enforces the three link-level invariants between a block
//! and its predecessor. It deliberately never inspects proof-of-work;
//! the difficulty prefix is checked separately where blocks are accepted,
//! so structure and work stay independently testable.

use crate::types::Block;

use super::error::ValidationError;

/// Block-pair and whole-chain validity checks.
#[derive(Clone, Copy, Debug, Default)]
pub struct Validator;

impl Validator {
    /// Validates `current` against its predecessor.
    ///
    /// Checks, in order: the stored hash matches the recomputed content
    /// hash, the previous-hash link matches, and the timestamp strictly
    /// increases.
    pub fn validate_block(
        &self,
        current: &Block,
        previous: &Block,
    ) -> Result<(), ValidationError> {
        if current.hash != current.calculate_hash() {
            return Err(ValidationError::InvalidHash {
                index: current.index,
            });
        }
        if current.previous_hash != previous.hash {
            return Err(ValidationError::InvalidLink {
                index: current.index,
            });
        }
        if current.timestamp <= previous.timestamp {
            return Err(ValidationError::InvalidTimestamp {
                index: current.index,
            });
        }
        Ok(())
    }

    /// Walks every adjacent pair of `chain`, failing on the first invalid
    /// link. An empty or single-block chain is trivially valid.
    pub fn validate_chain(&self, chain: &[Block]) -> Result<(), ValidationError> {
        for pair in chain.windows(2) {
            self.validate_block(&pair[1], &pair[0])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked_pair() -> (Block, Block) {
        let previous = Block::new(0, "0", 0.0, Vec::new());
        let current = Block::new(1, previous.hash.clone(), 1.0, Vec::new());
        (previous, current)
    }

    #[test]
    fn valid_pair_passes() {
        let (previous, current) = linked_pair();
        assert!(Validator.validate_block(&current, &previous).is_ok());
    }

    #[test]
    fn tampered_hash_is_rejected() {
        let (previous, mut current) = linked_pair();
        current.hash = "ffff".repeat(16);

        let err = Validator.validate_block(&current, &previous).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidHash { index: 1 }));
    }

    #[test]
    fn broken_link_is_rejected() {
        let (previous, _) = linked_pair();
        let unlinked = Block::new(1, "something else", 1.0, Vec::new());

        let err = Validator.validate_block(&unlinked, &previous).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidLink { index: 1 }));
    }

    #[test]
    fn non_increasing_timestamp_is_rejected() {
        let previous = Block::new(0, "0", 5.0, Vec::new());
        let current = Block::new(1, previous.hash.clone(), 5.0, Vec::new());

        let err = Validator.validate_block(&current, &previous).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTimestamp { index: 1 }));
    }

    #[test]
    fn chain_walk_finds_a_bad_middle_block() {
        let b0 = Block::new(0, "0", 0.0, Vec::new());
        let b1 = Block::new(1, b0.hash.clone(), 1.0, Vec::new());
        let b2 = Block::new(2, b1.hash.clone(), 2.0, Vec::new());

        let mut chain = vec![b0, b1, b2];
        assert!(Validator.validate_chain(&chain).is_ok());

        chain[1].hash = "ffff".repeat(16);
        let err = Validator.validate_chain(&chain).unwrap_err();
        assert_eq!(err.index(), 1);
    }

    #[test]
    fn short_chains_are_trivially_valid() {
        assert!(Validator.validate_chain(&[]).is_ok());
        assert!(
            Validator
                .validate_chain(&[Block::new(0, "0", 0.0, Vec::new())])
                .is_ok()
        );
    }
}
