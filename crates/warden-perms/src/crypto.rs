//! Symmetric encryption for declared document fields.
//!
//! Provides ChaCha20-Poly1305 authenticated encryption and a deterministic
//! text cipher built on it.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{PermsError, Result};

const KEY_CONTEXT: &str = "warden-perms-v0-field-key";
const NONCE_CONTEXT: &str = "warden-perms-v0-field-nonce";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A 256-bit symmetric encryption key for ChaCha20-Poly1305.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a key from configured secret material.
    pub fn derive(secret: &[u8]) -> Self {
        Self(blake3::derive_key(KEY_CONTEXT, secret))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt data with this key.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| PermsError::EncryptionError(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| PermsError::EncryptionError(e.to_string()))
    }

    /// Decrypt data with this key.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| PermsError::DecryptionError(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| PermsError::DecryptionError(e.to_string()))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// Opaque text encryption capability.
pub trait FieldCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// Deterministic ChaCha20-Poly1305 text cipher.
///
/// The nonce is a keyed BLAKE3 hash of the plaintext, so equal plaintexts
/// give equal ciphertexts. Output is lowercase hex of `nonce || sealed`.
pub struct ChaChaFieldCipher {
    key: EncryptionKey,
    nonce_key: [u8; 32],
}

impl ChaChaFieldCipher {
    pub fn new(key: EncryptionKey) -> Self {
        let nonce_key = blake3::derive_key(NONCE_CONTEXT, key.as_bytes());
        Self { key, nonce_key }
    }

    /// Build from configured secret material.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self::new(EncryptionKey::derive(secret))
    }

    fn nonce_for(&self, plaintext: &[u8]) -> EncryptionNonce {
        let hash = blake3::keyed_hash(&self.nonce_key, plaintext);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&hash.as_bytes()[..NONCE_LEN]);
        EncryptionNonce(nonce)
    }
}

impl FieldCipher for ChaChaFieldCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let nonce = self.nonce_for(plaintext.as_bytes());
        let sealed = self.key.encrypt(plaintext.as_bytes(), &nonce)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_bytes());
        out.extend_from_slice(&sealed);
        Ok(hex::encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }
        let bytes = hex::decode(ciphertext)
            .map_err(|e| PermsError::DecryptionError(format!("not hex: {}", e)))?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(PermsError::DecryptionError(format!(
                "ciphertext too short: {} bytes",
                bytes.len()
            )));
        }
        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce);

        let plaintext = self.key.decrypt(sealed, &EncryptionNonce(nonce_bytes))?;
        String::from_utf8(plaintext).map_err(|e| PermsError::DecryptionError(e.to_string()))
    }
}
