//! AES-256-GCM implementation of the [`Cipher`] seam.
//!
//! Each encryption draws a fresh 12-byte nonce and prepends it to the
//! ciphertext, so a single byte string carries everything needed to
//! decrypt. GCM authentication makes tampered ciphertexts fail closed.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;

use super::{Cipher, CryptoError};

/// Length of the GCM nonce prepended to every ciphertext.
const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher bound to one 32-byte key.
pub struct Aes256GcmCipher {
    cipher: Aes256Gcm,
}

impl Aes256GcmCipher {
    /// Builds a cipher for the given shared key.
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }
}

impl Cipher for Aes256GcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::Rng::fill(&mut OsRng, &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CryptoError::MalformedCiphertext);
        }
        let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, body)
            .map_err(|_| CryptoError::MalformedCiphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = Aes256GcmCipher::new(&[42u8; 32]);
        let plaintext = b"This is a secret message.";

        let sealed = cipher.encrypt(plaintext).expect("encryption succeeds");
        assert_ne!(&sealed[NONCE_LEN..], plaintext.as_slice());

        let opened = cipher.decrypt(&sealed).expect("decryption succeeds");
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let cipher = Aes256GcmCipher::new(&[42u8; 32]);
        let a = cipher.encrypt(b"same input").unwrap();
        let b = cipher.encrypt(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampering_and_wrong_keys_fail() {
        let cipher = Aes256GcmCipher::new(&[42u8; 32]);
        let mut sealed = cipher.encrypt(b"payload").unwrap();

        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(cipher.decrypt(&sealed).is_err());

        let other = Aes256GcmCipher::new(&[43u8; 32]);
        let sealed = cipher.encrypt(b"payload").unwrap();
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn short_ciphertexts_are_rejected() {
        let cipher = Aes256GcmCipher::new(&[42u8; 32]);
        let err = cipher.decrypt(&[0u8; 5]).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedCiphertext));
    }
}
