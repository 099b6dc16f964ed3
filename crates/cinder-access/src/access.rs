//! Vault lifecycle and access control
//!
//! All policy decisions live here: init validation, chunk upload rules,
//! finalize, the accessibility check ordering, atomic view consumption,
//! and delete-token verification. Blob bytes pass through opaquely.

use std::sync::Arc;

use cinder_core::config::VaultConfig;
use cinder_core::{
    unix_now, AccessPolicy, ChunkDescriptor, ChunkEntry, CinderError, CinderResult, ContentType,
    CryptoParams, UploadStatus, VaultRecord, VaultSummary,
};
use cinder_store::{blob, BlobStore, VaultStore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::tokens;
use crate::tokens::ServerSecret;

/// Wire algorithm tag accepted by this protocol version.
const ALGORITHM: &str = "AES-256-GCM";
const KEY_LENGTH: u32 = 32;
const IV_LENGTH: u32 = 12;
const PARAMS_VERSION: u32 = 1;

/// Why a vault is not accessible right now.
///
/// Deletion and expiry take precedence over quota and lockout: the most
/// permanent explanation wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    Deleted,
    /// Upload never completed; the vault is invisible to receivers
    NotReady,
    Expired,
    NoViewsRemaining,
    LockedOut,
    BeforeWindow,
    AfterWindow,
}

/// Evaluate accessibility for `record` at `now`.
///
/// Returns `None` when the vault may be served.
pub fn check_accessibility(record: &VaultRecord, now: u64) -> Option<DenialReason> {
    if record.is_deleted {
        return Some(DenialReason::Deleted);
    }
    if record.upload_status != UploadStatus::Complete {
        return Some(DenialReason::NotReady);
    }
    if record.expires_at <= now {
        return Some(DenialReason::Expired);
    }
    if record.remaining_views == 0 {
        return Some(DenialReason::NoViewsRemaining);
    }
    if record.failed_attempts >= record.policy.max_failed_attempts {
        return Some(DenialReason::LockedOut);
    }
    if let Some(start) = record.policy.access_window_start {
        if now < start {
            return Some(DenialReason::BeforeWindow);
        }
    }
    if let Some(end) = record.policy.access_window_end {
        if now > end {
            return Some(DenialReason::AfterWindow);
        }
    }
    None
}

/// Sender's vault registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitVaultRequest {
    pub total_size: u64,
    pub expected_chunks: u32,
    pub merkle_root: String,
    pub crypto_params: CryptoParams,
    pub content_type: ContentType,
    pub mime_type: Option<String>,
    pub encrypted_filename: Option<String>,
    #[serde(default)]
    pub policy: PolicyRequest,
}

/// Requested policy; unset fields take server defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub max_views: Option<u32>,
    pub expires_in_secs: Option<u64>,
    pub access_window_start: Option<u64>,
    pub access_window_end: Option<u64>,
    pub max_failed_attempts: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitVaultResponse {
    pub vault_id: String,
    pub expires_at: u64,
    pub max_views: u32,
    /// Returned exactly once; only its hash is stored
    pub delete_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadChunkResponse {
    pub chunk_index: u32,
    pub uploaded_chunks: u32,
    pub expected_chunks: u32,
}

/// A granted view: chunk descriptors plus the retrieval capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    pub chunks: Vec<ChunkDescriptor>,
    pub session_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedAttemptResponse {
    pub failed_attempts: u32,
    pub locked_out: bool,
}

/// The access controller: every server-side operation on a vault.
pub struct AccessController {
    store: Arc<dyn VaultStore>,
    blobs: BlobStore,
    secret: ServerSecret,
    limits: VaultConfig,
}

impl AccessController {
    pub fn new(
        store: Arc<dyn VaultStore>,
        blobs: BlobStore,
        secret: ServerSecret,
        limits: VaultConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            secret,
            limits,
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Register a new vault in `pending` state.
    pub async fn init_vault(&self, req: InitVaultRequest) -> CinderResult<InitVaultResponse> {
        self.validate_init(&req)?;

        let now = unix_now();
        let expires_at = now
            + req
                .policy
                .expires_in_secs
                .unwrap_or(self.limits.default_expiry_secs);
        let max_views = req.policy.max_views.unwrap_or(self.limits.default_max_views);
        let max_failed_attempts = req
            .policy
            .max_failed_attempts
            .unwrap_or(self.limits.default_max_failed_attempts);

        let vault_id = tokens::generate_vault_id();
        let delete_token = tokens::generate_delete_token();
        let metadata_hmac =
            tokens::metadata_hmac(&self.secret, &vault_id, &req.merkle_root, expires_at, max_views);

        let record = VaultRecord {
            vault_id: vault_id.clone(),
            chunks: Vec::new(),
            total_size: req.total_size,
            mime_type: req.mime_type,
            content_type: req.content_type,
            encrypted_filename: req.encrypted_filename,
            crypto_params: req.crypto_params,
            merkle_root: req.merkle_root,
            metadata_hmac,
            policy: AccessPolicy {
                max_views,
                access_window_start: req.policy.access_window_start,
                access_window_end: req.policy.access_window_end,
                max_failed_attempts,
            },
            remaining_views: max_views,
            failed_attempts: 0,
            expires_at,
            upload_status: UploadStatus::Pending,
            is_deleted: false,
            expected_chunks: req.expected_chunks,
            created_at: now,
            delete_token_hash: tokens::hash_token(&delete_token),
        };

        self.store.insert(record).await?;

        info!(
            vault_id = %vault_id,
            expected_chunks = req.expected_chunks,
            total_size = req.total_size,
            max_views,
            expires_at,
            "vault registered"
        );

        Ok(InitVaultResponse {
            vault_id,
            expires_at,
            max_views,
            delete_token,
        })
    }

    /// Store one ciphertext chunk. Idempotent per index: a retry
    /// replaces the blob and the chunk entry in place.
    pub async fn upload_chunk(
        &self,
        vault_id: &str,
        index: u32,
        ciphertext: &[u8],
        claimed_hash: &str,
    ) -> CinderResult<UploadChunkResponse> {
        let record = self
            .store
            .get(vault_id)
            .await?
            .ok_or(CinderError::AccessDenied)?;

        if record.is_deleted || record.upload_status != UploadStatus::Pending {
            return Err(CinderError::StateConflict(format!(
                "vault {vault_id} does not accept chunk writes"
            )));
        }
        if index >= record.expected_chunks {
            return Err(CinderError::Validation(format!(
                "chunk index {index} out of range (expected {} chunks)",
                record.expected_chunks
            )));
        }
        if ciphertext.is_empty() {
            return Err(CinderError::Validation("empty chunk".into()));
        }
        if ciphertext.len() as u64 > self.limits.max_chunk_size {
            return Err(CinderError::Validation(format!(
                "chunk of {} bytes exceeds limit {}",
                ciphertext.len(),
                self.limits.max_chunk_size
            )));
        }

        // The server only sees ciphertext, but it can still keep the
        // sender honest about what it claims to have hashed.
        let server_hash = hex::encode(Sha256::digest(ciphertext));
        if server_hash != claimed_hash {
            return Err(CinderError::Integrity(format!(
                "chunk {index} hash mismatch"
            )));
        }

        let key = blob::chunk_key(vault_id, index);
        self.blobs.put(&key, ciphertext.to_vec()).await?;

        let entry = ChunkEntry {
            index,
            blob_key: key,
            size: ciphertext.len() as u64,
            hash: server_hash,
        };
        let updated = self
            .store
            .update(vault_id, &move |r| {
                // Status re-checked under the update: chunks are
                // immutable once the vault is complete
                if r.is_deleted || r.upload_status != UploadStatus::Pending {
                    return Err(CinderError::StateConflict(format!(
                        "vault {} does not accept chunk writes",
                        r.vault_id
                    )));
                }
                r.upsert_chunk(entry.clone())
            })
            .await?
            .ok_or(CinderError::AccessDenied)?;

        debug!(vault_id, index, size = ciphertext.len(), "chunk stored");

        Ok(UploadChunkResponse {
            chunk_index: index,
            uploaded_chunks: updated.chunks.len() as u32,
            expected_chunks: updated.expected_chunks,
        })
    }

    /// Transition `pending → complete` once every expected chunk is
    /// present. Chunk writes happen before their record entries, so a
    /// full entry list implies the blobs are durably visible.
    pub async fn finalize(&self, vault_id: &str) -> CinderResult<VaultSummary> {
        let updated = self
            .store
            .update(vault_id, &|r| {
                if r.is_deleted || r.upload_status != UploadStatus::Pending {
                    return Err(CinderError::StateConflict(format!(
                        "vault {} is not pending",
                        r.vault_id
                    )));
                }
                if r.chunks.len() as u32 != r.expected_chunks {
                    return Err(CinderError::StateConflict(format!(
                        "vault {} has {}/{} chunks",
                        r.vault_id,
                        r.chunks.len(),
                        r.expected_chunks
                    )));
                }
                r.chunks.sort_by_key(|c| c.index);
                r.upload_status = UploadStatus::Complete;
                Ok(())
            })
            .await?
            .ok_or(CinderError::AccessDenied)?;

        info!(vault_id, chunks = updated.chunks.len(), "vault complete");
        Ok(updated.summary())
    }

    /// Abandon a pending upload: the vault becomes terminal and its
    /// partial blobs are deleted best-effort.
    pub async fn abort(&self, vault_id: &str) -> CinderResult<()> {
        let updated = self
            .store
            .update(vault_id, &|r| {
                if r.upload_status != UploadStatus::Pending {
                    return Err(CinderError::StateConflict(format!(
                        "vault {} is not pending",
                        r.vault_id
                    )));
                }
                r.upload_status = UploadStatus::Failed;
                r.is_deleted = true;
                Ok(())
            })
            .await?
            .ok_or(CinderError::AccessDenied)?;

        self.delete_blobs_best_effort(&updated).await;
        info!(vault_id, "upload aborted");
        Ok(())
    }

    /// Public summary without consuming a view. Inaccessible and unknown
    /// vaults are indistinguishable to the caller.
    pub async fn get_metadata(&self, vault_id: &str) -> CinderResult<VaultSummary> {
        let record = self.load_checked(vault_id).await?;
        if check_accessibility(&record, unix_now()).is_some() {
            return Err(CinderError::AccessDenied);
        }
        Ok(record.summary())
    }

    /// Consume one view and grant chunk retrieval.
    ///
    /// The accessibility pre-check and the decrement are separate steps;
    /// losing the decrement race to a concurrent caller is an expected
    /// outcome surfaced as `NoViewsRemaining`, same as an exhausted
    /// quota, never as an internal error.
    pub async fn grant_access(&self, vault_id: &str) -> CinderResult<AccessGrant> {
        let record = self.load_checked(vault_id).await?;
        let now = unix_now();
        match check_accessibility(&record, now) {
            Some(DenialReason::NoViewsRemaining) => return Err(CinderError::NoViewsRemaining),
            Some(_) => return Err(CinderError::AccessDenied),
            None => {}
        }

        let consumed = self
            .store
            .consume_view(vault_id)
            .await?
            .ok_or(CinderError::NoViewsRemaining)?;

        let mut chunks: Vec<ChunkDescriptor> = consumed
            .chunks
            .iter()
            .map(|c| ChunkDescriptor {
                index: c.index,
                size: c.size,
                hash: c.hash.clone(),
            })
            .collect();
        chunks.sort_by_key(|c| c.index);

        let session_token =
            tokens::issue_session(&self.secret, vault_id, now, self.limits.session_ttl_secs);

        info!(
            vault_id,
            remaining_views = consumed.remaining_views,
            "view consumed"
        );

        Ok(AccessGrant {
            chunks,
            session_token,
        })
    }

    /// Stream one ciphertext chunk back under a session token.
    ///
    /// Returns the bytes plus the stored content hash so the receiver
    /// can verify before decrypting.
    pub async fn download_chunk(
        &self,
        vault_id: &str,
        index: u32,
        session_token: &str,
    ) -> CinderResult<(Vec<u8>, String)> {
        let now = unix_now();
        if !tokens::verify_session(&self.secret, session_token, vault_id, now) {
            return Err(CinderError::AccessDenied);
        }

        let record = self.load_checked(vault_id).await?;
        // A session can outlive the vault: deletion and expiry still win.
        if record.is_deleted || record.expires_at <= now {
            return Err(CinderError::AccessDenied);
        }

        let entry = record
            .chunks
            .iter()
            .find(|c| c.index == index)
            .ok_or_else(|| CinderError::Validation(format!("unknown chunk index {index}")))?;

        let bytes = self.blobs.get(&entry.blob_key).await?;
        Ok((bytes, entry.hash.clone()))
    }

    /// Count a failed password/decrypt attempt. Works on otherwise
    /// inaccessible vaults so lockout cannot be dodged.
    pub async fn report_failed_attempt(
        &self,
        vault_id: &str,
    ) -> CinderResult<FailedAttemptResponse> {
        let updated = self
            .store
            .record_failed_attempt(vault_id)
            .await?
            .ok_or(CinderError::AccessDenied)?;

        let locked_out = updated.failed_attempts >= updated.policy.max_failed_attempts;
        if locked_out {
            warn!(
                vault_id,
                failed_attempts = updated.failed_attempts,
                "vault locked out"
            );
        }

        Ok(FailedAttemptResponse {
            failed_attempts: updated.failed_attempts,
            locked_out,
        })
    }

    /// Token-authenticated deletion. Soft-deletes the record (the
    /// reconciler removes it later) and clears blobs best-effort.
    pub async fn delete_vault(&self, vault_id: &str, delete_token: &str) -> CinderResult<()> {
        let record = self
            .store
            .get(vault_id)
            .await?
            .ok_or(CinderError::AccessDenied)?;

        if !tokens::token_matches(delete_token, &record.delete_token_hash) {
            return Err(CinderError::AccessDenied);
        }

        let updated = self
            .store
            .update(vault_id, &|r| {
                r.is_deleted = true;
                Ok(())
            })
            .await?
            .ok_or(CinderError::AccessDenied)?;

        self.delete_blobs_best_effort(&updated).await;
        info!(vault_id, "vault deleted by owner token");
        Ok(())
    }

    /// Load a record and verify its tamper-evidence tag before any
    /// policy field feeds a decision.
    async fn load_checked(&self, vault_id: &str) -> CinderResult<VaultRecord> {
        let record = self
            .store
            .get(vault_id)
            .await?
            .ok_or(CinderError::AccessDenied)?;

        let expected = tokens::metadata_hmac(
            &self.secret,
            &record.vault_id,
            &record.merkle_root,
            record.expires_at,
            record.policy.max_views,
        );
        if expected != record.metadata_hmac {
            return Err(CinderError::Integrity(format!(
                "metadata tag mismatch for vault {vault_id}"
            )));
        }
        Ok(record)
    }

    /// Fire-and-forget blob cleanup: per-item failures are logged and
    /// left for the next reconciler sweep.
    async fn delete_blobs_best_effort(&self, record: &VaultRecord) {
        for chunk in &record.chunks {
            if let Err(e) = self.blobs.delete(&chunk.blob_key).await {
                warn!(
                    vault_id = %record.vault_id,
                    blob_key = %chunk.blob_key,
                    "blob delete failed (left for sweep): {e}"
                );
            }
        }
    }

    fn validate_init(&self, req: &InitVaultRequest) -> CinderResult<()> {
        if req.expected_chunks == 0 {
            return Err(CinderError::Validation("expected_chunks must be >= 1".into()));
        }
        if req.expected_chunks > self.limits.max_chunks {
            return Err(CinderError::Validation(format!(
                "expected_chunks {} exceeds limit {}",
                req.expected_chunks, self.limits.max_chunks
            )));
        }
        if req.total_size == 0 || req.total_size > self.limits.max_total_size {
            return Err(CinderError::Validation(format!(
                "total_size {} outside (0, {}]",
                req.total_size, self.limits.max_total_size
            )));
        }
        if req.merkle_root.len() != 64 || hex::decode(&req.merkle_root).is_err() {
            return Err(CinderError::Validation(
                "merkle_root must be a 64-char hex digest".into(),
            ));
        }

        let p = &req.crypto_params;
        if p.version != PARAMS_VERSION {
            return Err(CinderError::Validation(format!(
                "unsupported crypto params version {}",
                p.version
            )));
        }
        if p.algorithm != ALGORITHM || p.key_length != KEY_LENGTH || p.iv_length != IV_LENGTH {
            return Err(CinderError::Validation(
                "unsupported cipher parameters".into(),
            ));
        }
        if p.is_password_protected {
            let Some(salt) = &p.pbkdf2_salt else {
                return Err(CinderError::Validation(
                    "password protection requires pbkdf2_salt".into(),
                ));
            };
            if hex::decode(salt).map(|s| s.len()) != Ok(16) {
                return Err(CinderError::Validation(
                    "pbkdf2_salt must be 16 bytes hex".into(),
                ));
            }
            if p.pbkdf2_iterations < self.limits.min_pbkdf2_iterations {
                return Err(CinderError::Validation(format!(
                    "pbkdf2_iterations {} below minimum {}",
                    p.pbkdf2_iterations, self.limits.min_pbkdf2_iterations
                )));
            }
        }

        let pol = &req.policy;
        if let Some(max_views) = pol.max_views {
            if max_views == 0 || max_views > self.limits.max_views {
                return Err(CinderError::Validation(format!(
                    "max_views {} outside [1, {}]",
                    max_views, self.limits.max_views
                )));
            }
        }
        if let Some(expiry) = pol.expires_in_secs {
            if expiry == 0 || expiry > self.limits.max_expiry_secs {
                return Err(CinderError::Validation(format!(
                    "expires_in_secs {} outside (0, {}]",
                    expiry, self.limits.max_expiry_secs
                )));
            }
        }
        if let (Some(start), Some(end)) = (pol.access_window_start, pol.access_window_end) {
            if start >= end {
                return Err(CinderError::Validation(
                    "access window start must precede end".into(),
                ));
            }
        }
        if pol.max_failed_attempts == Some(0) {
            return Err(CinderError::Validation(
                "max_failed_attempts must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_store::MemoryVaultStore;

    fn params() -> CryptoParams {
        CryptoParams {
            algorithm: ALGORITHM.into(),
            key_length: KEY_LENGTH,
            iv_length: IV_LENGTH,
            is_password_protected: false,
            pbkdf2_salt: None,
            pbkdf2_iterations: 0,
            password_check: None,
            version: PARAMS_VERSION,
        }
    }

    fn request(expected_chunks: u32) -> InitVaultRequest {
        InitVaultRequest {
            total_size: 1024,
            expected_chunks,
            merkle_root: hex::encode([0u8; 32]),
            crypto_params: params(),
            content_type: ContentType::File,
            mime_type: Some("application/octet-stream".into()),
            encrypted_filename: None,
            policy: PolicyRequest::default(),
        }
    }

    fn controller() -> (AccessController, Arc<MemoryVaultStore>) {
        let store = Arc::new(MemoryVaultStore::new());
        let controller = AccessController::new(
            store.clone(),
            BlobStore::memory(),
            ServerSecret::from_bytes([11u8; 32]),
            VaultConfig::default(),
        );
        (controller, store)
    }

    fn chunk_bytes(tag: u8) -> (Vec<u8>, String) {
        let bytes = vec![tag; 64];
        let hash = hex::encode(Sha256::digest(&bytes));
        (bytes, hash)
    }

    async fn complete_vault(
        controller: &AccessController,
        chunks: u32,
        policy: PolicyRequest,
    ) -> InitVaultResponse {
        let mut req = request(chunks);
        req.policy = policy;
        let init = controller.init_vault(req).await.unwrap();
        for i in 0..chunks {
            let (bytes, hash) = chunk_bytes(i as u8);
            controller
                .upload_chunk(&init.vault_id, i, &bytes, &hash)
                .await
                .unwrap();
        }
        controller.finalize(&init.vault_id).await.unwrap();
        init
    }

    // ── accessibility ordering ────────────────────────────────────────

    fn record_for_check() -> VaultRecord {
        VaultRecord {
            vault_id: "v".into(),
            chunks: Vec::new(),
            total_size: 1,
            mime_type: None,
            content_type: ContentType::Text,
            encrypted_filename: None,
            crypto_params: params(),
            merkle_root: String::new(),
            metadata_hmac: String::new(),
            policy: AccessPolicy {
                max_views: 1,
                access_window_start: None,
                access_window_end: None,
                max_failed_attempts: 3,
            },
            remaining_views: 1,
            failed_attempts: 0,
            expires_at: 1000,
            upload_status: UploadStatus::Complete,
            is_deleted: false,
            expected_chunks: 1,
            created_at: 0,
            delete_token_hash: String::new(),
        }
    }

    #[test]
    fn deletion_beats_every_other_reason() {
        let mut r = record_for_check();
        r.is_deleted = true;
        r.remaining_views = 0;
        r.failed_attempts = 99;
        assert_eq!(check_accessibility(&r, 5000), Some(DenialReason::Deleted));
    }

    #[test]
    fn expiry_beats_quota_and_lockout() {
        let mut r = record_for_check();
        r.remaining_views = 0;
        r.failed_attempts = 99;
        assert_eq!(check_accessibility(&r, 5000), Some(DenialReason::Expired));
    }

    #[test]
    fn expired_even_with_views_left() {
        let r = record_for_check();
        assert_eq!(check_accessibility(&r, 1000), Some(DenialReason::Expired));
    }

    #[test]
    fn quota_beats_lockout() {
        let mut r = record_for_check();
        r.remaining_views = 0;
        r.failed_attempts = 99;
        assert_eq!(
            check_accessibility(&r, 500),
            Some(DenialReason::NoViewsRemaining)
        );
    }

    #[test]
    fn window_checks_come_last() {
        let mut r = record_for_check();
        r.policy.access_window_start = Some(600);
        r.policy.access_window_end = Some(900);

        assert_eq!(
            check_accessibility(&r, 500),
            Some(DenialReason::BeforeWindow)
        );
        assert_eq!(check_accessibility(&r, 700), None);
        assert_eq!(
            check_accessibility(&r, 950),
            Some(DenialReason::AfterWindow)
        );
    }

    #[test]
    fn pending_vault_is_not_ready() {
        let mut r = record_for_check();
        r.upload_status = UploadStatus::Pending;
        assert_eq!(check_accessibility(&r, 500), Some(DenialReason::NotReady));
    }

    // ── init validation ───────────────────────────────────────────────

    #[tokio::test]
    async fn init_rejects_zero_chunks() {
        let (controller, _) = controller();
        let result = controller.init_vault(request(0)).await;
        assert!(matches!(result, Err(CinderError::Validation(_))));
    }

    #[tokio::test]
    async fn init_rejects_bad_merkle_root() {
        let (controller, _) = controller();
        let mut req = request(1);
        req.merkle_root = "zz".into();
        assert!(matches!(
            controller.init_vault(req).await,
            Err(CinderError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn init_rejects_weak_pbkdf2() {
        let (controller, _) = controller();
        let mut req = request(1);
        req.crypto_params.is_password_protected = true;
        req.crypto_params.pbkdf2_salt = Some(hex::encode([1u8; 16]));
        req.crypto_params.pbkdf2_iterations = 1000;
        assert!(matches!(
            controller.init_vault(req).await,
            Err(CinderError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn init_rejects_unknown_params_version() {
        let (controller, _) = controller();
        let mut req = request(1);
        req.crypto_params.version = 2;
        assert!(matches!(
            controller.init_vault(req).await,
            Err(CinderError::Validation(_))
        ));
    }

    // ── upload / finalize lifecycle ───────────────────────────────────

    #[tokio::test]
    async fn full_upload_and_burn_after_read() {
        let (controller, _) = controller();
        let init = complete_vault(&controller, 3, PolicyRequest::default()).await;

        // First access: 3 descriptors, sorted
        let grant = controller.grant_access(&init.vault_id).await.unwrap();
        assert_eq!(grant.chunks.len(), 3);
        assert!(grant.chunks.windows(2).all(|w| w[0].index < w[1].index));

        // Chunks are retrievable under the session
        let (bytes, hash) = controller
            .download_chunk(&init.vault_id, 1, &grant.session_token)
            .await
            .unwrap();
        assert_eq!(bytes, vec![1u8; 64]);
        assert_eq!(hash, hex::encode(Sha256::digest(&bytes)));

        // Second access: burned (default max_views = 1)
        assert!(matches!(
            controller.grant_access(&init.vault_id).await,
            Err(CinderError::NoViewsRemaining)
        ));
    }

    #[tokio::test]
    async fn reupload_same_index_replaces() {
        let (controller, store) = controller();
        let init = controller.init_vault(request(2)).await.unwrap();

        let (bytes_a, hash_a) = chunk_bytes(0xAA);
        let (bytes_b, hash_b) = chunk_bytes(0xBB);

        let first = controller
            .upload_chunk(&init.vault_id, 0, &bytes_a, &hash_a)
            .await
            .unwrap();
        assert_eq!(first.uploaded_chunks, 1);

        let second = controller
            .upload_chunk(&init.vault_id, 0, &bytes_b, &hash_b)
            .await
            .unwrap();
        assert_eq!(second.uploaded_chunks, 1, "replacement must not grow");

        let record = store.get(&init.vault_id).await.unwrap().unwrap();
        assert_eq!(record.chunks[0].hash, hash_b);
    }

    #[tokio::test]
    async fn upload_rejects_wrong_hash() {
        let (controller, _) = controller();
        let init = controller.init_vault(request(1)).await.unwrap();

        let (bytes, _) = chunk_bytes(1);
        let result = controller
            .upload_chunk(&init.vault_id, 0, &bytes, &hex::encode([0u8; 32]))
            .await;
        assert!(matches!(result, Err(CinderError::Integrity(_))));
    }

    #[tokio::test]
    async fn upload_rejects_out_of_range_index() {
        let (controller, _) = controller();
        let init = controller.init_vault(request(2)).await.unwrap();

        let (bytes, hash) = chunk_bytes(1);
        let result = controller.upload_chunk(&init.vault_id, 2, &bytes, &hash).await;
        assert!(matches!(result, Err(CinderError::Validation(_))));
    }

    #[tokio::test]
    async fn finalize_requires_all_chunks() {
        let (controller, _) = controller();
        let init = controller.init_vault(request(3)).await.unwrap();

        let (bytes, hash) = chunk_bytes(0);
        controller
            .upload_chunk(&init.vault_id, 0, &bytes, &hash)
            .await
            .unwrap();

        assert!(matches!(
            controller.finalize(&init.vault_id).await,
            Err(CinderError::StateConflict(_))
        ));
    }

    #[tokio::test]
    async fn finalize_sorts_out_of_order_uploads() {
        let (controller, store) = controller();
        let init = controller.init_vault(request(3)).await.unwrap();

        for i in [2u32, 0, 1] {
            let (bytes, hash) = chunk_bytes(i as u8);
            controller
                .upload_chunk(&init.vault_id, i, &bytes, &hash)
                .await
                .unwrap();
        }
        controller.finalize(&init.vault_id).await.unwrap();

        let record = store.get(&init.vault_id).await.unwrap().unwrap();
        let indices: Vec<u32> = record.chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn upload_after_finalize_conflicts() {
        let (controller, _) = controller();
        let init = complete_vault(&controller, 1, PolicyRequest::default()).await;

        let (bytes, hash) = chunk_bytes(9);
        let result = controller.upload_chunk(&init.vault_id, 0, &bytes, &hash).await;
        assert!(matches!(result, Err(CinderError::StateConflict(_))));
    }

    #[tokio::test]
    async fn abort_makes_vault_terminal() {
        let (controller, store) = controller();
        let init = controller.init_vault(request(2)).await.unwrap();
        let (bytes, hash) = chunk_bytes(0);
        controller
            .upload_chunk(&init.vault_id, 0, &bytes, &hash)
            .await
            .unwrap();

        controller.abort(&init.vault_id).await.unwrap();

        let record = store.get(&init.vault_id).await.unwrap().unwrap();
        assert!(record.is_terminal());
        assert!(matches!(
            controller.finalize(&init.vault_id).await,
            Err(CinderError::StateConflict(_))
        ));
    }

    // ── access policy enforcement ─────────────────────────────────────

    #[tokio::test]
    async fn metadata_does_not_consume_views() {
        let (controller, store) = controller();
        let init = complete_vault(&controller, 1, PolicyRequest::default()).await;

        controller.get_metadata(&init.vault_id).await.unwrap();
        controller.get_metadata(&init.vault_id).await.unwrap();

        let record = store.get(&init.vault_id).await.unwrap().unwrap();
        assert_eq!(record.remaining_views, 1);
    }

    #[tokio::test]
    async fn unknown_vault_is_access_denied() {
        let (controller, _) = controller();
        assert!(matches!(
            controller.get_metadata("no-such-vault").await,
            Err(CinderError::AccessDenied)
        ));
        assert!(matches!(
            controller.grant_access("no-such-vault").await,
            Err(CinderError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn lockout_blocks_access() {
        let (controller, _) = controller();
        let init = complete_vault(
            &controller,
            1,
            PolicyRequest {
                max_views: Some(5),
                max_failed_attempts: Some(2),
                ..Default::default()
            },
        )
        .await;

        let first = controller.report_failed_attempt(&init.vault_id).await.unwrap();
        assert!(!first.locked_out);
        let second = controller.report_failed_attempt(&init.vault_id).await.unwrap();
        assert!(second.locked_out);

        // Even a correct password cannot reopen a locked vault
        assert!(matches!(
            controller.grant_access(&init.vault_id).await,
            Err(CinderError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn failed_attempts_do_not_touch_views() {
        let (controller, store) = controller();
        let init = complete_vault(&controller, 1, PolicyRequest::default()).await;

        controller.report_failed_attempt(&init.vault_id).await.unwrap();

        let record = store.get(&init.vault_id).await.unwrap().unwrap();
        assert_eq!(record.remaining_views, 1);
        assert_eq!(record.failed_attempts, 1);
    }

    #[tokio::test]
    async fn tampered_metadata_is_integrity_error() {
        let (controller, store) = controller();
        let init = complete_vault(&controller, 1, PolicyRequest::default()).await;

        store
            .update(&init.vault_id, &|r| {
                r.expires_at += 10_000;
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(
            controller.grant_access(&init.vault_id).await,
            Err(CinderError::Integrity(_))
        ));
    }

    #[tokio::test]
    async fn racing_grants_consume_exactly_one_view() {
        let (controller, _) = controller();
        let init = complete_vault(&controller, 1, PolicyRequest::default()).await;
        let controller = Arc::new(controller);

        let a = {
            let c = controller.clone();
            let id = init.vault_id.clone();
            tokio::spawn(async move { c.grant_access(&id).await })
        };
        let b = {
            let c = controller.clone();
            let id = init.vault_id.clone();
            tokio::spawn(async move { c.grant_access(&id).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let granted = results.iter().filter(|r| r.is_ok()).count();
        let burned = results
            .iter()
            .filter(|r| matches!(r, Err(CinderError::NoViewsRemaining)))
            .count();

        assert_eq!(granted, 1);
        assert_eq!(burned, 1);
    }

    // ── sessions and deletion ─────────────────────────────────────────

    #[tokio::test]
    async fn download_requires_valid_session() {
        let (controller, _) = controller();
        let init = complete_vault(&controller, 1, PolicyRequest::default()).await;

        assert!(matches!(
            controller.download_chunk(&init.vault_id, 0, "bogus").await,
            Err(CinderError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn session_is_not_transferable_across_vaults() {
        let (controller, _) = controller();
        let a = complete_vault(&controller, 1, PolicyRequest { max_views: Some(2), ..Default::default() }).await;
        let b = complete_vault(&controller, 1, PolicyRequest::default()).await;

        let grant = controller.grant_access(&a.vault_id).await.unwrap();
        assert!(matches!(
            controller
                .download_chunk(&b.vault_id, 0, &grant.session_token)
                .await,
            Err(CinderError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn delete_requires_matching_token() {
        let (controller, store) = controller();
        let init = complete_vault(&controller, 1, PolicyRequest::default()).await;

        assert!(matches!(
            controller.delete_vault(&init.vault_id, "wrong").await,
            Err(CinderError::AccessDenied)
        ));

        controller
            .delete_vault(&init.vault_id, &init.delete_token)
            .await
            .unwrap();

        let record = store.get(&init.vault_id).await.unwrap().unwrap();
        assert!(record.is_deleted);
        assert!(matches!(
            controller.get_metadata(&init.vault_id).await,
            Err(CinderError::AccessDenied)
        ));
    }
}
