//! Per-chunk AES-256-GCM encryption/decryption
//!
//! Encrypted chunk format (binary):
//! ```text
//! [12 bytes: random IV][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! A fresh random 96-bit IV is drawn inside `encrypt_chunk` for every
//! call. IV reuse under the same key is a critical failure, so callers
//! cannot supply their own.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;

use crate::keys::VaultKey;
use crate::{CryptoError, CryptoResult, IV_SIZE, TAG_SIZE};

/// Encrypt a single chunk with AES-256-GCM.
///
/// Returns `[12-byte IV][ciphertext][16-byte tag]`.
pub fn encrypt_chunk(key: &VaultKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::InvalidInput("chunk encryption failed".into()))?;

    let mut result = Vec::with_capacity(IV_SIZE + ciphertext.len());
    result.extend_from_slice(&iv);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a single chunk produced by [`encrypt_chunk`].
///
/// Fails with [`CryptoError::Integrity`] on tag mismatch: wrong key,
/// wrong password, or tampering, none of which are distinguished here.
pub fn decrypt_chunk(key: &VaultKey, encrypted: &[u8]) -> CryptoResult<Vec<u8>> {
    if encrypted.len() < IV_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "encrypted chunk too short: {} bytes (minimum {})",
            encrypted.len(),
            IV_SIZE + TAG_SIZE
        )));
    }

    let (iv, ciphertext) = encrypted.split_at(IV_SIZE);
    let nonce = Nonce::from_slice(iv);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Integrity)
}
