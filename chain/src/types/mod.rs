//! Core domain types used by the chain.
//!
//! This module defines the two records that everything else moves around:
//! [`Transaction`] and [`Block`], together with the canonical JSON encoding
//! both use for hashing and for the wire.
//!
//! Canonical form means: a JSON object whose keys appear in lexicographic
//! order and whose byte-valued fields are lowercase hex strings. Hashing is
//! always SHA-256 over the UTF-8 bytes of that encoding, rendered as a hex
//! digest. The same form is used everywhere a digest or a wire body is
//! needed, to avoid format drift between peers.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub mod block;
pub mod tx;

pub use block::Block;
pub use tx::Transaction;

/// An opaque participant address: the raw bytes of a key-agreement public
/// value. `None` marks system-minted entries such as mining rewards.
pub type Address = Option<Vec<u8>>;

/// Renders an optional byte field the way the canonical encoding expects:
/// lowercase hex for present values, JSON `null` for absent ones.
pub(crate) fn hex_or_null(bytes: &Address) -> Value {
    match bytes {
        Some(b) => Value::String(hex::encode(b)),
        None => Value::Null,
    }
}

/// Serializes a canonical object and returns its SHA-256 hex digest.
///
/// The caller is responsible for inserting keys in sorted order; this
/// helper only fixes the hashing side (UTF-8 JSON in, lowercase hex out).
pub(crate) fn sha256_hex_of(map: &Map<String, Value>) -> String {
    let encoded = serde_json::to_string(map)
        .expect("canonical maps contain only JSON-serializable values");
    let digest = Sha256::digest(encoded.as_bytes());
    hex::encode(digest)
}

/// Serde adapter for optional byte fields carried as hex-or-null on the
/// wire (`sender`, `recipient`, `signature`, `sign_public_key`).
pub(crate) mod hex_opt {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text: Option<String> = Option::deserialize(deserializer)?;
        match text {
            Some(s) => hex::decode(&s).map(Some).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}
