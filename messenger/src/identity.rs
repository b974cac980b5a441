//! Node identity: username plus the two keypairs every node carries.
//!
//! The signing keypair authenticates transactions; the agreement keypair
//! doubles as the node's address on the chain and as its half of each
//! per-peer shared encryption key.

use chain::crypto::{CryptoError, KeyAgreement, Signer};
use chain::{Ed25519Signer, X25519KeyAgreement};

/// Long-lived identity of a running node.
pub struct NodeIdentity {
    pub username: String,
    signer: Ed25519Signer,
    agreement: X25519KeyAgreement,
}

impl NodeIdentity {
    /// Generates a fresh identity for this run. Keys are not persisted;
    /// a restarted node is a new participant.
    pub fn generate(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            signer: Ed25519Signer::generate(),
            agreement: X25519KeyAgreement::generate(),
        }
    }

    /// The transaction-signing capability.
    pub fn signer(&self) -> &dyn Signer {
        &self.signer
    }

    /// Byte encoding of the signature verification key.
    pub fn sign_public_key(&self) -> Vec<u8> {
        self.signer.public_key()
    }

    /// The node's address: its key-agreement public value.
    pub fn agreement_public_key(&self) -> Vec<u8> {
        self.agreement.public_value()
    }

    /// Derives the 32-byte key shared with the holder of `peer_public`.
    pub fn shared_secret(&self, peer_public: &[u8]) -> Result<[u8; 32], CryptoError> {
        self.agreement.shared_secret(peer_public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_distinct() {
        let alice = NodeIdentity::generate("alice");
        let bob = NodeIdentity::generate("bob");

        assert_ne!(alice.sign_public_key(), bob.sign_public_key());
        assert_ne!(alice.agreement_public_key(), bob.agreement_public_key());
    }

    #[test]
    fn peers_agree_on_the_shared_secret() {
        let alice = NodeIdentity::generate("alice");
        let bob = NodeIdentity::generate("bob");

        let a = alice
            .shared_secret(&bob.agreement_public_key())
            .expect("valid peer key");
        let b = bob
            .shared_secret(&alice.agreement_public_key())
            .expect("valid peer key");
        assert_eq!(a, b);
    }
}
