//! Key material: content key generation, PBKDF2 password key, XOR + HKDF
//! combination into the chunk encryption key

use hkdf::Hkdf;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{CryptoError, CryptoResult, KEY_SIZE, SALT_SIZE};

/// HKDF info string binding the combined key to this protocol.
/// Protocol constant: both endpoints must use the exact same value or
/// password-protected vaults fail to decrypt.
const COMBINE_INFO: &[u8] = b"cinder/combined-key/v1";

/// A 256-bit symmetric key. Zeroized on drop.
#[derive(Clone)]
pub struct VaultKey {
    bytes: [u8; KEY_SIZE],
}

impl VaultKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for VaultKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit content key.
///
/// This key is only ever exported for embedding in the link fragment the
/// sender hands to the receiver; it is never sent to the server.
pub fn generate_content_key() -> VaultKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    VaultKey::from_bytes(bytes)
}

/// Generate a random PBKDF2 salt. Public: stored server-side as-is.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit password key via PBKDF2-HMAC-SHA256.
///
/// The password never leaves the endpoint; only the salt and iteration
/// count are persisted server-side.
pub fn derive_password_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    iterations: u32,
) -> CryptoResult<VaultKey> {
    if iterations == 0 {
        return Err(CryptoError::Kdf("iteration count must be non-zero".into()));
    }
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut key,
    );
    Ok(VaultKey::from_bytes(key))
}

/// Combine the content key and password key into the chunk encryption key.
///
/// XOR pre-combination followed by an HKDF-SHA256 expansion with a fixed
/// info string. Deterministic for the same inputs. The exact function is
/// a protocol constant; changing it breaks every existing
/// password-protected vault.
pub fn combine_keys(content: &VaultKey, password: &VaultKey) -> CryptoResult<VaultKey> {
    let mut ikm = [0u8; KEY_SIZE];
    for (i, byte) in ikm.iter_mut().enumerate() {
        *byte = content.as_bytes()[i] ^ password.as_bytes()[i];
    }

    let hkdf = Hkdf::<Sha256>::new(None, &ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(COMBINE_INFO, &mut okm)
        .map_err(|e| CryptoError::Kdf(format!("HKDF expand failed: {e}")))?;
    ikm.zeroize();

    Ok(VaultKey::from_bytes(okm))
}
