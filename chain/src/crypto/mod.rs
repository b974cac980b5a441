//! Crypto capability seams consumed by the ledger and the node.
//!
//! The chain core depends on three narrow capabilities rather than on any
//! particular construction:
//!
//! - [`Signer`]: produce and check detached signatures over byte strings,
//! - [`KeyAgreement`]: publish a public value and derive a 32-byte shared
//!   secret from a peer's public value,
//! - [`Cipher`]: encrypt and decrypt byte strings under a 32-byte key.
//!
//! The standard constructions live in the submodules: Ed25519 signatures
//! (`sign`), X25519 + HKDF-SHA256 agreement (`agree`), and AES-256-GCM
//! with a prepended nonce (`cipher`).

use std::fmt;

pub mod agree;
pub mod cipher;
pub mod sign;

pub use agree::X25519KeyAgreement;
pub use cipher::Aes256GcmCipher;
pub use sign::Ed25519Signer;

/// Errors surfaced by the concrete crypto constructions.
#[derive(Debug)]
pub enum CryptoError {
    /// A public value had the wrong length or encoding.
    InvalidPublicKey,
    /// Symmetric encryption failed.
    EncryptionFailed,
    /// The ciphertext is too short to carry a nonce, or decryption /
    /// authentication failed.
    MalformedCiphertext,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::InvalidPublicKey => write!(f, "invalid public key"),
            CryptoError::EncryptionFailed => write!(f, "encryption failed"),
            CryptoError::MalformedCiphertext => write!(f, "malformed or unauthentic ciphertext"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Detached-signature capability.
pub trait Signer: Send + Sync {
    /// Byte encoding of the verification key matching this signer.
    fn public_key(&self) -> Vec<u8>;

    /// Signs `message`, returning the detached signature bytes.
    fn sign(&self, message: &[u8]) -> Vec<u8>;

    /// Verifies `signature` over `message` under an arbitrary peer's
    /// `public_key` (not necessarily this signer's own).
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

/// Pairwise shared-secret derivation.
pub trait KeyAgreement: Send + Sync {
    /// The public value to advertise to peers.
    fn public_value(&self) -> Vec<u8>;

    /// Derives the 32-byte symmetric key shared with the holder of
    /// `peer_public`. Both parties derive the same key.
    fn shared_secret(&self, peer_public: &[u8]) -> Result<[u8; 32], CryptoError>;
}

/// Symmetric encryption under a fixed 32-byte key.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}
