//! cinder-crypto: Client-side E2E encryption for Cinder vaults
//!
//! Pipeline: plaintext → fixed-size chunk → AES-256-GCM encrypt → SHA-256
//! hash ciphertext → Merkle root over ordered hashes → upload
//!
//! Key material:
//! ```text
//! Content Key (256-bit random, travels only in the link fragment)
//! Password Key (PBKDF2-HMAC-SHA256 over the password, salt stored server-side)
//!   └── Combined Key = HKDF-SHA256(XOR(content, password), info="cinder/combined-key/v1")
//! ```
//!
//! When no password is set the content key encrypts chunks directly. The
//! server only ever sees ciphertext, ciphertext hashes, and the public
//! KDF parameters. Nothing in this crate touches network or storage.

pub mod chunk;
pub mod keys;
pub mod merkle;
pub mod pwcheck;

pub use chunk::{decrypt_chunk, encrypt_chunk};
pub use keys::{combine_keys, derive_password_key, generate_content_key, generate_salt, VaultKey};
pub use merkle::{hash_chunk, merkle_root};
pub use pwcheck::{generate_password_check, verify_password_check};

use thiserror::Error;

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM IV (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a PBKDF2 salt
pub const SALT_SIZE: usize = 16;

/// Default PBKDF2 iteration count (protocol constant)
pub const PBKDF2_ITERATIONS: u32 = 100_000;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Authentication tag mismatch: wrong key, wrong password, or
    /// tampering. Deliberately indistinguishable at this layer.
    #[error("integrity check failed: wrong key or corrupted data")]
    Integrity,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("key derivation failed: {0}")]
    Kdf(String),
}
