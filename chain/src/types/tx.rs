//! Transaction record, canonical hashing, signing, and verification.
//!
//! A transaction is the atomic unit carried by blocks: an (optionally
//! absent) sender, a recipient, a non-negative amount, an opaque content
//! string (usually hex-encoded ciphertext), the signer's verification key,
//! and a detached signature. Hashing covers every field except the
//! signature itself, so the digest is stable across signing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::crypto::{Signer, sign::verify_detached};

use super::{Address, hex_opt, hex_or_null, sha256_hex_of};

/// Reasons a transaction is rejected or cannot be signed.
#[derive(Debug)]
pub enum TransactionError {
    /// `sign` was called on a transaction without both endpoints.
    MissingParticipant,
    /// The signature is absent or does not verify under the stated key.
    InvalidSignature,
    /// The sender's confirmed balance does not cover the amount.
    InsufficientFunds { balance: i64, amount: u64 },
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::MissingParticipant => {
                write!(f, "transaction must include sender and recipient")
            }
            TransactionError::InvalidSignature => {
                write!(f, "transaction signature verification failed")
            }
            TransactionError::InsufficientFunds { balance, amount } => {
                write!(f, "insufficient funds: balance {balance} < amount {amount}")
            }
        }
    }
}

impl std::error::Error for TransactionError {}

/// A signed (or system-minted) message / transfer record.
///
/// Byte-valued fields travel as hex-or-null in JSON. The `timestamp` is
/// the wall-clock time at creation rendered as a decimal string; it is
/// part of the hashed content but never compared between transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, with = "hex_opt")]
    pub sender: Address,
    #[serde(default, with = "hex_opt")]
    pub recipient: Address,
    pub amount: u64,
    pub content: String,
    #[serde(default, with = "hex_opt")]
    pub signature: Option<Vec<u8>>,
    #[serde(default, with = "hex_opt")]
    pub sign_public_key: Option<Vec<u8>>,
    pub timestamp: String,
}

impl Transaction {
    /// Creates an unsigned transaction stamped with the current wall time.
    pub fn new(
        sender: Address,
        recipient: Address,
        amount: u64,
        content: impl Into<String>,
        sign_public_key: Option<Vec<u8>>,
    ) -> Self {
        Self {
            sender,
            recipient,
            amount,
            content: content.into(),
            signature: None,
            sign_public_key,
            timestamp: current_timestamp_string(),
        }
    }

    /// Returns the canonical field map: keys in lexicographic order, byte
    /// fields as lowercase hex, the timestamp as its decimal string.
    pub fn to_canonical_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("amount".to_string(), Value::from(self.amount));
        map.insert("content".to_string(), Value::from(self.content.clone()));
        map.insert("recipient".to_string(), hex_or_null(&self.recipient));
        map.insert("sender".to_string(), hex_or_null(&self.sender));
        map.insert(
            "sign_public_key".to_string(),
            hex_or_null(&self.sign_public_key),
        );
        map.insert("signature".to_string(), hex_or_null(&self.signature));
        map.insert("timestamp".to_string(), Value::from(self.timestamp.clone()));
        map
    }

    /// SHA-256 hex digest of the canonical JSON with the signature removed.
    ///
    /// Removing the signature keeps the digest identical before and after
    /// signing, which is what `sign` and `is_valid` both operate on.
    pub fn calculate_hash(&self) -> String {
        let mut map = self.to_canonical_map();
        map.remove("signature");
        sha256_hex_of(&map)
    }

    /// Signs the transaction hash with the given signer.
    ///
    /// Fails if either endpoint is absent; system-minted entries are never
    /// signed.
    pub fn sign(&mut self, signer: &dyn Signer) -> Result<(), TransactionError> {
        if self.sender.is_none() || self.recipient.is_none() {
            return Err(TransactionError::MissingParticipant);
        }
        let hash = self.calculate_hash();
        self.signature = Some(signer.sign(hash.as_bytes()));
        Ok(())
    }

    /// Verifies the stored signature over the current hash under
    /// `public_key`. Absent signature or key fails closed.
    pub fn is_valid(&self, public_key: &[u8]) -> bool {
        let Some(signature) = &self.signature else {
            tracing::debug!("no signature in this transaction");
            return false;
        };
        if public_key.is_empty() {
            tracing::debug!("no public key provided");
            return false;
        }
        let hash = self.calculate_hash();
        verify_detached(public_key, hash.as_bytes(), signature)
    }

    /// True for system-minted entries (mining rewards), which carry no
    /// sender and are accepted without a signature.
    pub fn is_system(&self) -> bool {
        self.sender.is_none()
    }
}

/// Wall-clock seconds since the Unix epoch as a decimal string.
///
/// On a clock before the epoch this falls back to "0".
fn current_timestamp_string() -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs_f64();
    format!("{seconds}")
}
