//! Block record and canonical hashing.
//!
//! A block binds an index, the previous block's hash, a wall-clock
//! timestamp, an ordered list of transactions, and the proof-of-work
//! nonce. Its stored `hash` is authoritative once set: validation
//! recomputes the digest and requires an exact match.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{Transaction, sha256_hex_of};

/// One block of the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Creates a block with nonce 0 and its content-derived hash.
    ///
    /// Mining then increments the nonce and refreshes the hash until the
    /// difficulty target is met.
    pub fn new(
        index: u64,
        previous_hash: impl Into<String>,
        timestamp: f64,
        transactions: Vec<Transaction>,
    ) -> Self {
        let mut block = Self {
            index,
            previous_hash: previous_hash.into(),
            timestamp,
            transactions,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The fixed first block every honest node starts from: index 0,
    /// previous hash `"0"`, timestamp 0, no transactions, nonce 0.
    pub fn genesis() -> Self {
        Self::new(0, "0", 0.0, Vec::new())
    }

    /// Returns the canonical field map, transactions rendered through
    /// their own canonical maps (signatures included).
    pub fn to_canonical_map(&self) -> Map<String, Value> {
        let timestamp = Number::from_f64(self.timestamp)
            .expect("block timestamps are finite");

        let transactions: Vec<Value> = self
            .transactions
            .iter()
            .map(|tx| Value::Object(tx.to_canonical_map()))
            .collect();

        let mut map = Map::new();
        map.insert("hash".to_string(), Value::from(self.hash.clone()));
        map.insert("index".to_string(), Value::from(self.index));
        map.insert("nonce".to_string(), Value::from(self.nonce));
        map.insert(
            "previous_hash".to_string(),
            Value::from(self.previous_hash.clone()),
        );
        map.insert("timestamp".to_string(), Value::Number(timestamp));
        map.insert("transactions".to_string(), Value::Array(transactions));
        map
    }

    /// SHA-256 hex digest over the canonical JSON of
    /// `{index, nonce, previous_hash, timestamp, transactions}`.
    pub fn calculate_hash(&self) -> String {
        let mut map = self.to_canonical_map();
        map.remove("hash");
        sha256_hex_of(&map)
    }
}

/// Wall-clock seconds since the Unix epoch, as used for block timestamps.
pub(crate) fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_tx(content: &str) -> Transaction {
        Transaction::new(
            Some(b"Alice".to_vec()),
            Some(b"Bob".to_vec()),
            0,
            content,
            None,
        )
    }

    #[test]
    fn genesis_is_fixed() {
        let genesis = Block::genesis();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.timestamp, 0.0);
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.nonce, 0);
        assert_eq!(genesis.hash, genesis.calculate_hash());

        // Two nodes computing genesis independently agree on its hash.
        assert_eq!(Block::genesis().hash, genesis.hash);
    }

    #[test]
    fn hash_tracks_content() {
        let block = Block::new(1, "00ab", 1_700_000_000.5, vec![dummy_tx("hi")]);
        let baseline = block.calculate_hash();

        let mut reindexed = block.clone();
        reindexed.index = 2;
        assert_ne!(reindexed.calculate_hash(), baseline);

        let mut renonced = block.clone();
        renonced.nonce = 7;
        assert_ne!(renonced.calculate_hash(), baseline);

        let mut retimed = block.clone();
        retimed.timestamp += 1.0;
        assert_ne!(retimed.calculate_hash(), baseline);
    }

    #[test]
    fn stored_hash_is_authoritative() {
        let mut block = Block::new(1, "00ab", 1.0, Vec::new());
        assert_eq!(block.hash, block.calculate_hash());

        block.hash = "ffff".repeat(16);
        assert_ne!(block.hash, block.calculate_hash());
    }

    #[test]
    fn canonical_map_keys_are_sorted() {
        let block = Block::new(1, "00ab", 1.0, vec![dummy_tx("hi")]);
        let canonical_map = block.to_canonical_map();
        let keys: Vec<&str> = canonical_map.keys().map(String::as_str).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn wire_json_roundtrips() {
        let block = Block::new(3, "00cd", 42.25, vec![dummy_tx("one"), dummy_tx("two")]);
        let json = serde_json::to_string(&block).expect("block encodes");
        let back: Block = serde_json::from_str(&json).expect("block decodes");

        assert_eq!(back, block);
        assert_eq!(back.calculate_hash(), block.calculate_hash());
    }
}
