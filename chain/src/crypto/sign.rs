//! Ed25519 implementation of the [`Signer`] seam.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use super::Signer;

/// Verifies a detached Ed25519 signature under an encoded public key.
///
/// Any decoding failure (wrong key or signature length) fails closed.
pub fn verify_detached(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <&[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(key_bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}

/// Ed25519 signing identity.
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Generates a fresh keypair from the OS random number generator.
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        rand::Rng::fill(&mut OsRng, &mut secret);
        Self {
            signing_key: SigningKey::from_bytes(&secret),
        }
    }

    /// Restores a signer from a 32-byte secret.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }
}

impl Signer for Ed25519Signer {
    fn public_key(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_bytes().to_vec()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        verify_detached(public_key, message, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let signer = Ed25519Signer::generate();
        let message = b"a secure message";

        let signature = signer.sign(message);
        assert!(verify_detached(&signer.public_key(), message, &signature));
    }

    #[test]
    fn verification_fails_closed() {
        let signer = Ed25519Signer::generate();
        let other = Ed25519Signer::generate();
        let message = b"a secure message";
        let signature = signer.sign(message);

        // Wrong key.
        assert!(!verify_detached(&other.public_key(), message, &signature));
        // Wrong message.
        assert!(!verify_detached(&signer.public_key(), b"tampered", &signature));
        // Malformed inputs.
        assert!(!verify_detached(&[], message, &signature));
        assert!(!verify_detached(&signer.public_key(), message, &[1, 2, 3]));
    }

    #[test]
    fn secret_bytes_restore_the_same_identity() {
        let secret = [7u8; 32];
        let a = Ed25519Signer::from_secret_bytes(&secret);
        let b = Ed25519Signer::from_secret_bytes(&secret);
        assert_eq!(a.public_key(), b.public_key());
    }
}
