//! Secret encryption and token generation.
//!
//! Stored secrets are sealed with AES-256-GCM under a key derived from the
//! process-wide passphrase (`store.secret_key`). The on-disk layout is
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::BrokerError;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Bytes of fresh randomness mixed into every token.
const TOKEN_ENTROPY: usize = 32;

/// Process-wide cipher for the secret column.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretCipher {
    key: [u8; KEY_SIZE],
}

impl SecretCipher {
    /// Derive the AES key as SHA-256 over the configured passphrase.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, BrokerError> {
        if passphrase.is_empty() {
            return Err(BrokerError::Validation(
                "store.secret_key must not be empty".to_string(),
            ));
        }
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, BrokerError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| BrokerError::Encrypt(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| BrokerError::Encrypt(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    /// Any failure here means the row was sealed under a different key
    /// (or is corrupt); it is reported as `Decrypt`, never as a missing token.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Zeroizing<String>, BrokerError> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(BrokerError::Decrypt);
        }
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| BrokerError::Decrypt)?;
        let (nonce, body) = sealed.split_at(NONCE_SIZE);
        let plain = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), body)
                .map_err(|_| BrokerError::Decrypt)?,
        );
        let text = std::str::from_utf8(&plain).map_err(|_| BrokerError::Decrypt)?;
        Ok(Zeroizing::new(text.to_owned()))
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretCipher([REDACTED, {} bytes])", KEY_SIZE)
    }
}

/// Issue a fresh opaque token: hex SHA-256 over address, schema and
/// 32 bytes from the OS CSPRNG.
pub fn generate_token(address: &str, schema: &str) -> String {
    let mut entropy = Zeroizing::new([0u8; TOKEN_ENTROPY]);
    OsRng.fill_bytes(&mut *entropy);

    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    hasher.update([0u8]);
    hasher.update(schema.as_bytes());
    hasher.update([0u8]);
    hasher.update(&*entropy);
    hex::encode(hasher.finalize())
}
