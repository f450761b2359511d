//! Symmetric encryption for datasource passwords.
//!
//! Passwords are stored as AES-256-GCM ciphertext in a base64 envelope of
//! `nonce || ciphertext || tag`. The auth tag means a wrong key or a
//! tampered envelope fails decryption instead of yielding garbage.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

/// AES-256 key length in bytes.
pub const KEY_LENGTH: usize = 32;

/// AES-GCM nonce length in bytes.
const NONCE_LENGTH: usize = 12;

/// AES-GCM authentication tag length in bytes.
const TAG_LENGTH: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be exactly {KEY_LENGTH} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("malformed ciphertext envelope")]
    MalformedCiphertext,
    #[error("decryption failed")]
    DecryptionFailed,
}

/// Process-wide cipher for datasource passwords.
///
/// Constructed once at startup from the configured key; construction fails
/// fast when the key is not exactly [`KEY_LENGTH`] bytes.
#[derive(Clone)]
pub struct PasswordCipher {
    cipher: Aes256Gcm,
}

impl PasswordCipher {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LENGTH {
            return Err(CryptoError::InvalidKeyLength(key.len()));
        }
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
        Ok(Self { cipher })
    }

    /// Encrypts a plaintext password into a base64 envelope.
    ///
    /// A fresh random nonce is generated per call, so encrypting the same
    /// plaintext twice yields different envelopes.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        getrandom::fill(&mut nonce_bytes).expect("CSPRNG failure");

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .expect("AES-GCM encryption cannot fail with valid inputs");

        let mut envelope = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        BASE64.encode(envelope)
    }

    /// Decrypts a base64 envelope produced by [`Self::encrypt`].
    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let bytes = BASE64
            .decode(envelope)
            .map_err(|_| CryptoError::MalformedCiphertext)?;
        if bytes.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::MalformedCiphertext);
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::MalformedCiphertext)
    }
}
