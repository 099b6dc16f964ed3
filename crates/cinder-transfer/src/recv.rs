//! Receiver-side orchestration: verify-then-decrypt download sequence
//!
//! Ordering matters here: the password check (when the record carries
//! one) runs strictly before `grant_access`, so a wrong password never
//! consumes a view; it reports a failed attempt instead. Hash and
//! Merkle verification run on ciphertext before any decryption.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use cinder_access::AccessController;
use cinder_core::{CinderError, CinderResult, ContentType, VaultSummary};
use cinder_crypto::{
    combine_keys, decrypt_chunk, derive_password_key, hash_chunk, merkle_root,
    verify_password_check, CryptoError, VaultKey, KEY_SIZE, SALT_SIZE,
};
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::crypto_err;

/// Decrypted share content.
#[derive(Debug)]
pub struct ReceiveOutcome {
    pub plaintext: Vec<u8>,
    pub content_type: ContentType,
    pub mime_type: Option<String>,
    /// Decrypted original filename, when the sender set one
    pub filename: Option<String>,
}

/// Open a share: consume one view and return the decrypted content.
///
/// `key_fragment` is the base64url content key from the link fragment.
pub async fn receive(
    controller: &AccessController,
    vault_id: &str,
    key_fragment: &str,
    password: Option<SecretString>,
) -> CinderResult<ReceiveOutcome> {
    let summary = controller.get_metadata(vault_id).await?;
    let chunk_key = derive_chunk_key(&summary, key_fragment, password.as_ref())?;

    // Pre-access password verification. Absent check ciphertext means a
    // legacy record: the first chunk decryption failure reports the
    // failed attempt instead. By then the view is spent; a consumed
    // view is never returned.
    if summary.crypto_params.is_password_protected {
        if let Some(check_b64) = &summary.crypto_params.password_check {
            let check = STANDARD
                .decode(check_b64)
                .map_err(|_| CinderError::Validation("malformed password check".into()))?;
            if !verify_password_check(&chunk_key, &check) {
                report_attempt(controller, vault_id).await;
                return Err(CinderError::Integrity("password verification failed".into()));
            }
            debug!(vault_id, "password check passed");
        }
    }

    let grant = controller.grant_access(vault_id).await?;

    // Download and hash-verify every chunk before decrypting anything
    let mut ciphertexts = Vec::with_capacity(grant.chunks.len());
    let mut hashes = Vec::with_capacity(grant.chunks.len());
    for descriptor in &grant.chunks {
        let (bytes, stored_hash) = controller
            .download_chunk(vault_id, descriptor.index, &grant.session_token)
            .await?;

        let actual = hash_chunk(&bytes);
        if actual != descriptor.hash || actual != stored_hash {
            return Err(CinderError::Integrity(format!(
                "chunk {} hash mismatch",
                descriptor.index
            )));
        }
        hashes.push(actual);
        ciphertexts.push(bytes);
    }

    let root = merkle_root(&hashes).map_err(crypto_err)?;
    if root.as_deref() != Some(summary.merkle_root.as_str()) {
        return Err(CinderError::Integrity(
            "Merkle root mismatch: transfer tampered or incomplete".into(),
        ));
    }

    // Decrypt and reassemble in index order
    let mut plaintext = Vec::new();
    for (descriptor, ciphertext) in grant.chunks.iter().zip(&ciphertexts) {
        match decrypt_chunk(&chunk_key, ciphertext) {
            Ok(chunk) => plaintext.extend(chunk),
            Err(CryptoError::Integrity) => {
                // Wrong key/password on a legacy record, or tampering
                // the hashes could not catch
                report_attempt(controller, vault_id).await;
                return Err(CinderError::Integrity(format!(
                    "chunk {} failed authenticated decryption",
                    descriptor.index
                )));
            }
            Err(e) => return Err(crypto_err(e)),
        }
    }

    let filename = match &summary.encrypted_filename {
        Some(ct_b64) => {
            let ct = STANDARD
                .decode(ct_b64)
                .map_err(|_| CinderError::Validation("malformed encrypted filename".into()))?;
            let name = decrypt_chunk(&chunk_key, &ct).map_err(crypto_err)?;
            Some(String::from_utf8(name).map_err(|_| {
                CinderError::Integrity("filename decrypted to invalid UTF-8".into())
            })?)
        }
        None => None,
    };

    info!(
        vault_id,
        bytes = plaintext.len(),
        chunks = grant.chunks.len(),
        "share received and verified"
    );

    Ok(ReceiveOutcome {
        plaintext,
        content_type: summary.content_type,
        mime_type: summary.mime_type,
        filename,
    })
}

/// Re-derive the chunk encryption key from the link fragment and (if the
/// vault demands one) the password.
fn derive_chunk_key(
    summary: &VaultSummary,
    key_fragment: &str,
    password: Option<&SecretString>,
) -> CinderResult<VaultKey> {
    let raw = URL_SAFE_NO_PAD
        .decode(key_fragment)
        .map_err(|_| CinderError::Validation("malformed key fragment".into()))?;
    let bytes: [u8; KEY_SIZE] = raw
        .try_into()
        .map_err(|_| CinderError::Validation("key fragment must be 32 bytes".into()))?;
    let content_key = VaultKey::from_bytes(bytes);

    let params = &summary.crypto_params;
    if !params.is_password_protected {
        return Ok(content_key);
    }

    let Some(password) = password else {
        return Err(CinderError::Validation(
            "this share requires a password".into(),
        ));
    };
    let salt_hex = params
        .pbkdf2_salt
        .as_ref()
        .ok_or_else(|| CinderError::Validation("record is missing its salt".into()))?;
    let salt: [u8; SALT_SIZE] = hex::decode(salt_hex)
        .ok()
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| CinderError::Validation("malformed pbkdf2 salt".into()))?;

    let password_key =
        derive_password_key(password, &salt, params.pbkdf2_iterations).map_err(crypto_err)?;
    combine_keys(&content_key, &password_key).map_err(crypto_err)
}

async fn report_attempt(controller: &AccessController, vault_id: &str) {
    if let Err(e) = controller.report_failed_attempt(vault_id).await {
        warn!(vault_id, "failed to record attempt: {e}");
    }
}
