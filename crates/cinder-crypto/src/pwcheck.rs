//! Pre-access password verification
//!
//! A fixed, publicly-known marker is encrypted under the session's
//! derived key at send time and stored in the vault's public crypto
//! parameters. The receiver can then learn "is this password correct"
//! before any view-consuming operation. Best-effort: records without a
//! check ciphertext are tolerated, and the receiver falls back to
//! treating the first chunk decryption failure as a wrong password.

use crate::chunk::{decrypt_chunk, encrypt_chunk};
use crate::keys::VaultKey;
use crate::CryptoResult;

/// The known plaintext marker. Not a secret.
const CHECK_MARKER: &[u8] = b"cinder-password-check-v1";

/// Encrypt the marker under `key`, producing the check ciphertext stored
/// in the vault's public parameters.
pub fn generate_password_check(key: &VaultKey) -> CryptoResult<Vec<u8>> {
    encrypt_chunk(key, CHECK_MARKER)
}

/// True iff `check` decrypts under `key` to the marker.
///
/// Any decryption failure means "wrong key" here, not an error: a wrong
/// password is an expected outcome, reported to the caller as `false`.
pub fn verify_password_check(key: &VaultKey, check: &[u8]) -> bool {
    match decrypt_chunk(key, check) {
        Ok(plaintext) => plaintext == CHECK_MARKER,
        Err(_) => false,
    }
}
