use serde::{Deserialize, Serialize};

use crate::error::{CinderError, CinderResult};

/// What kind of content a vault carries (descriptive only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    File,
}

/// Upload lifecycle of a vault.
///
/// `Pending` accepts chunk writes; `Complete` is immutable and visible to
/// receivers; `Failed` is terminal and only waits for cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Complete,
    Failed,
}

/// One uploaded ciphertext chunk, unique per index within a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    /// Zero-based chunk index
    pub index: u32,
    /// Blob store key holding the ciphertext
    pub blob_key: String,
    /// Ciphertext size in bytes (includes IV + tag overhead)
    pub size: u64,
    /// SHA-256 of the ciphertext (hex)
    pub hash: String,
}

/// The chunk fields a receiver needs to fetch and verify (no blob key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub index: u32,
    pub size: u64,
    pub hash: String,
}

/// Public (non-secret) crypto parameters the receiver needs to re-derive
/// keys. Closed structure: future algorithm changes dispatch on `version`,
/// never by probing optional fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoParams {
    /// AEAD algorithm tag, e.g. "AES-256-GCM"
    pub algorithm: String,
    /// Key length in bytes
    pub key_length: u32,
    /// IV length in bytes
    pub iv_length: u32,
    /// Whether a password key is combined into the chunk key
    pub is_password_protected: bool,
    /// PBKDF2 salt (hex), present iff password protected
    pub pbkdf2_salt: Option<String>,
    /// PBKDF2 iteration count
    pub pbkdf2_iterations: u32,
    /// Encrypted marker allowing a pre-access password check (base64).
    /// Absent on legacy records; the receiver then falls back to
    /// "first chunk decryption failure implies wrong password".
    pub password_check: Option<String>,
    /// Parameter format version
    pub version: u32,
}

/// Access policy fixed at vault creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Total successful views allowed before the vault burns
    pub max_views: u32,
    /// Earliest accepted access time (unix secs), if any
    pub access_window_start: Option<u64>,
    /// Latest accepted access time (unix secs), if any
    pub access_window_end: Option<u64>,
    /// Failed password/decrypt attempts before lockout
    pub max_failed_attempts: u32,
}

/// One vault: the single metadata record for a shared item.
///
/// `remaining_views` and `failed_attempts` are only ever mutated through
/// the record store's atomic primitives; everything else is set at
/// creation or during the pending upload phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    pub vault_id: String,
    pub chunks: Vec<ChunkEntry>,
    pub total_size: u64,
    pub mime_type: Option<String>,
    pub content_type: ContentType,
    /// Filename ciphertext, opaque to the server
    pub encrypted_filename: Option<String>,
    pub crypto_params: CryptoParams,
    /// Merkle root over ordered ciphertext chunk hashes (hex)
    pub merkle_root: String,
    /// HMAC over (vault_id, merkle_root, expires_at, max_views) with a
    /// server-held secret; checked on privileged reads
    pub metadata_hmac: String,
    pub policy: AccessPolicy,
    pub remaining_views: u32,
    pub failed_attempts: u32,
    /// Absolute deadline (unix secs); past it the vault is logically gone
    pub expires_at: u64,
    pub upload_status: UploadStatus,
    pub is_deleted: bool,
    /// Chunk count fixed at creation; finalize requires all present
    pub expected_chunks: u32,
    pub created_at: u64,
    /// SHA-256 of the delete token (hex); the token itself is never stored
    pub delete_token_hash: String,
}

impl VaultRecord {
    /// Insert or replace the chunk entry at `entry.index`.
    ///
    /// Idempotent under retry: re-uploading an index replaces the entry in
    /// place without growing `chunks`. Indices outside
    /// `[0, expected_chunks)` are rejected.
    pub fn upsert_chunk(&mut self, entry: ChunkEntry) -> CinderResult<()> {
        if entry.index >= self.expected_chunks {
            return Err(CinderError::Validation(format!(
                "chunk index {} out of range (expected {} chunks)",
                entry.index, self.expected_chunks
            )));
        }
        match self.chunks.iter_mut().find(|c| c.index == entry.index) {
            Some(existing) => *existing = entry,
            None => self.chunks.push(entry),
        }
        Ok(())
    }

    /// True once no further state transition is permitted.
    pub fn is_terminal(&self) -> bool {
        self.is_deleted || self.upload_status == UploadStatus::Failed
    }

    /// Public summary safe to return to any caller.
    pub fn summary(&self) -> VaultSummary {
        VaultSummary {
            vault_id: self.vault_id.clone(),
            total_size: self.total_size,
            mime_type: self.mime_type.clone(),
            content_type: self.content_type,
            encrypted_filename: self.encrypted_filename.clone(),
            crypto_params: self.crypto_params.clone(),
            merkle_root: self.merkle_root.clone(),
            expected_chunks: self.expected_chunks,
            expires_at: self.expires_at,
            remaining_views: self.remaining_views,
        }
    }
}

/// The vault fields disclosed to receivers (no counters internals, no
/// blob keys, no HMAC, no delete token hash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSummary {
    pub vault_id: String,
    pub total_size: u64,
    pub mime_type: Option<String>,
    pub content_type: ContentType,
    pub encrypted_filename: Option<String>,
    pub crypto_params: CryptoParams,
    pub merkle_root: String,
    pub expected_chunks: u32,
    pub expires_at: u64,
    pub remaining_views: u32,
}
