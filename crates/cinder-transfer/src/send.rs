//! Sender-side orchestration: encrypt pipeline + multi-step upload

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use cinder_access::{AccessController, InitVaultRequest, PolicyRequest};
use cinder_core::{CinderError, CinderResult, ContentType, CryptoParams};
use cinder_crypto::{
    combine_keys, derive_password_key, encrypt_chunk, generate_content_key,
    generate_password_check, generate_salt, hash_chunk, merkle_root, VaultKey, IV_SIZE, KEY_SIZE,
    PBKDF2_ITERATIONS,
};
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::{crypto_err, DEFAULT_CHUNK_SIZE};

/// One encrypted chunk ready for upload.
#[derive(Debug, Clone)]
pub struct EncryptedChunk {
    pub index: u32,
    pub ciphertext: Vec<u8>,
    /// SHA-256 of the ciphertext (hex)
    pub hash: String,
}

/// Lazy, finite encryption pipeline over a plaintext buffer.
///
/// Yields `(ciphertext, hash)` pairs chunk by chunk. Restartable from
/// the start by constructing a fresh pipeline. A restart draws fresh
/// IVs, so ciphertexts (and therefore the Merkle root) differ between
/// passes; one pass feeds one vault.
pub struct ChunkPipeline<'a> {
    key: &'a VaultKey,
    plaintext: &'a [u8],
    chunk_size: usize,
    next_index: u32,
}

impl<'a> ChunkPipeline<'a> {
    pub fn new(key: &'a VaultKey, plaintext: &'a [u8], chunk_size: usize) -> Self {
        Self {
            key,
            plaintext,
            chunk_size: chunk_size.max(1),
            next_index: 0,
        }
    }

    /// Number of chunks this pipeline will yield.
    pub fn chunk_count(&self) -> u32 {
        self.plaintext.len().div_ceil(self.chunk_size) as u32
    }
}

impl Iterator for ChunkPipeline<'_> {
    type Item = CinderResult<EncryptedChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_index as usize * self.chunk_size;
        if start >= self.plaintext.len() {
            return None;
        }
        let end = (start + self.chunk_size).min(self.plaintext.len());
        let index = self.next_index;
        self.next_index += 1;

        Some(
            encrypt_chunk(self.key, &self.plaintext[start..end])
                .map(|ciphertext| {
                    let hash = hash_chunk(&ciphertext);
                    EncryptedChunk {
                        index,
                        ciphertext,
                        hash,
                    }
                })
                .map_err(crypto_err),
        )
    }
}

/// Sender knobs. Defaults: 1 MiB chunks, no password, server-default
/// policy.
#[derive(Default)]
pub struct SendOptions {
    pub chunk_size: Option<usize>,
    pub password: Option<SecretString>,
    pub policy: PolicyRequest,
    pub mime_type: Option<String>,
    /// Plaintext filename; encrypted client-side before registration
    pub filename: Option<String>,
}

/// Everything the sender needs to build the share link and manage the
/// vault afterwards. `key_fragment` is the only copy of the key.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub vault_id: String,
    /// base64url content key; goes in the link fragment, never to the server
    pub key_fragment: String,
    pub delete_token: String,
    pub expires_at: u64,
    pub max_views: u32,
}

/// Encrypt `plaintext` and drive the full upload sequence.
pub async fn send(
    controller: &AccessController,
    plaintext: &[u8],
    content_type: ContentType,
    opts: SendOptions,
) -> CinderResult<SendOutcome> {
    if plaintext.is_empty() {
        return Err(CinderError::Validation("nothing to share".into()));
    }
    let chunk_size = opts.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);

    // Key setup: content key alone, or combined with a password key
    let content_key = generate_content_key();
    let (chunk_key, crypto_params) = match &opts.password {
        Some(password) => {
            let salt = generate_salt();
            let password_key =
                derive_password_key(password, &salt, PBKDF2_ITERATIONS).map_err(crypto_err)?;
            let combined = combine_keys(&content_key, &password_key).map_err(crypto_err)?;
            let check = generate_password_check(&combined).map_err(crypto_err)?;
            let params = CryptoParams {
                algorithm: "AES-256-GCM".into(),
                key_length: KEY_SIZE as u32,
                iv_length: IV_SIZE as u32,
                is_password_protected: true,
                pbkdf2_salt: Some(hex::encode(salt)),
                pbkdf2_iterations: PBKDF2_ITERATIONS,
                password_check: Some(STANDARD.encode(check)),
                version: 1,
            };
            (combined, params)
        }
        None => {
            let params = CryptoParams {
                algorithm: "AES-256-GCM".into(),
                key_length: KEY_SIZE as u32,
                iv_length: IV_SIZE as u32,
                is_password_protected: false,
                pbkdf2_salt: None,
                pbkdf2_iterations: 0,
                password_check: None,
                version: 1,
            };
            (content_key.clone(), params)
        }
    };

    let encrypted_filename = match &opts.filename {
        Some(name) => Some(
            encrypt_chunk(&chunk_key, name.as_bytes())
                .map(|ct| STANDARD.encode(ct))
                .map_err(crypto_err)?,
        ),
        None => None,
    };

    // One full pipeline pass; the Merkle root is bound to exactly these
    // ciphertexts
    let pipeline = ChunkPipeline::new(&chunk_key, plaintext, chunk_size);
    let expected_chunks = pipeline.chunk_count();
    let chunks: Vec<EncryptedChunk> = pipeline.collect::<CinderResult<_>>()?;
    let hashes: Vec<String> = chunks.iter().map(|c| c.hash.clone()).collect();
    let root = merkle_root(&hashes)
        .map_err(crypto_err)?
        .ok_or_else(|| CinderError::Validation("nothing to share".into()))?;

    let total_size: u64 = chunks.iter().map(|c| c.ciphertext.len() as u64).sum();

    let init = controller
        .init_vault(InitVaultRequest {
            total_size,
            expected_chunks,
            merkle_root: root,
            crypto_params,
            content_type,
            mime_type: opts.mime_type,
            encrypted_filename,
            policy: opts.policy,
        })
        .await?;

    debug!(vault_id = %init.vault_id, chunks = expected_chunks, "vault registered, uploading");

    // Upload every chunk; transient failures get one idempotent retry,
    // anything else aborts the vault so partial blobs do not linger
    for chunk in &chunks {
        if let Err(e) = upload_with_retry(controller, &init.vault_id, chunk).await {
            warn!(vault_id = %init.vault_id, index = chunk.index, "upload failed, aborting: {e}");
            if let Err(abort_err) = controller.abort(&init.vault_id).await {
                warn!(vault_id = %init.vault_id, "abort after failure also failed: {abort_err}");
            }
            return Err(e);
        }
    }

    controller.finalize(&init.vault_id).await?;

    info!(
        vault_id = %init.vault_id,
        chunks = expected_chunks,
        bytes = total_size,
        "share uploaded"
    );

    Ok(SendOutcome {
        vault_id: init.vault_id,
        key_fragment: URL_SAFE_NO_PAD.encode(content_key.as_bytes()),
        delete_token: init.delete_token,
        expires_at: init.expires_at,
        max_views: init.max_views,
    })
}

async fn upload_with_retry(
    controller: &AccessController,
    vault_id: &str,
    chunk: &EncryptedChunk,
) -> CinderResult<()> {
    match controller
        .upload_chunk(vault_id, chunk.index, &chunk.ciphertext, &chunk.hash)
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.is_transient() => {
            debug!(vault_id, index = chunk.index, "transient upload failure, retrying");
            controller
                .upload_chunk(vault_id, chunk.index, &chunk.ciphertext, &chunk.hash)
                .await
                .map(|_| ())
        }
        Err(e) => Err(e),
    }
}
