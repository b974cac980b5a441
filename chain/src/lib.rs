//! Chain library crate.
//!
//! This crate provides the ledger core of the peer-to-peer messenger:
//!
//! - canonical domain types (`types`): transactions and blocks hashed
//!   over sorted-key JSON,
//! - the ledger (`ledger`): confirmed chain plus mempool with atomic
//!   validate-and-append operations,
//! - consensus pieces (`consensus`): the proof-of-work miner, structural
//!   validation, and their configuration,
//! - crypto capability seams (`crypto`): signing, key agreement, and
//!   symmetric encryption traits with standard constructions.
//!
//! The node binary composes these pieces with its transport, discovery,
//! and sync layers.

pub mod consensus;
pub mod crypto;
pub mod ledger;
pub mod types;

// Re-export "core" consensus types.
pub use consensus::{ConsensusConfig, ProofOfWork, ValidationError, Validator};

// Re-export the ledger and its admission outcomes.
pub use ledger::{BlockAdmission, Ledger, TxAdmission};

// Re-export the crypto seams and standard constructions.
pub use crypto::{
    Aes256GcmCipher, Cipher, CryptoError, Ed25519Signer, KeyAgreement, Signer,
    X25519KeyAgreement,
};

// Re-export domain types at the crate root for convenience.
pub use types::tx::TransactionError;
pub use types::{Address, Block, Transaction};
