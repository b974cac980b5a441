//! X25519 implementation of the [`KeyAgreement`] seam.
//!
//! The raw Diffie-Hellman output is passed through HKDF-SHA256 with a
//! fixed info string, so both parties derive the same uniform 32-byte
//! symmetric key from each other's public values.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use super::{CryptoError, KeyAgreement};

/// Context string bound into the HKDF expansion.
const KDF_INFO: &[u8] = b"dh key exchange";

/// X25519 key-agreement identity.
pub struct X25519KeyAgreement {
    secret: StaticSecret,
    public: PublicKey,
}

impl X25519KeyAgreement {
    /// Generates a fresh agreement keypair from the OS random number
    /// generator.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut OsRng, &mut bytes);
        Self::from_secret_bytes(bytes)
    }

    /// Restores an identity from a 32-byte secret.
    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        let secret = StaticSecret::from(secret);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }
}

impl KeyAgreement for X25519KeyAgreement {
    fn public_value(&self) -> Vec<u8> {
        self.public.as_bytes().to_vec()
    }

    fn shared_secret(&self, peer_public: &[u8]) -> Result<[u8; 32], CryptoError> {
        let peer_bytes =
            <[u8; 32]>::try_from(peer_public).map_err(|_| CryptoError::InvalidPublicKey)?;
        let peer_key = PublicKey::from(peer_bytes);
        let raw = self.secret.diffie_hellman(&peer_key);

        let hkdf = Hkdf::<Sha256>::new(None, raw.as_bytes());
        let mut derived = [0u8; 32];
        hkdf.expand(KDF_INFO, &mut derived)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        Ok(derived)
    }
}
