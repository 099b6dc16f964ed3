//! Vault record store: atomic counters + read-modify-write mutations

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use cinder_core::{CinderError, CinderResult, UploadStatus, VaultRecord};

/// Mutation closure applied under the store's update primitive.
pub type Mutation<'a> = &'a (dyn Fn(&mut VaultRecord) -> CinderResult<()> + Send + Sync);

/// The single-document metadata store behind the access controller.
///
/// `consume_view` is the one operation that must be a true conditional
/// update: two racing callers on a vault with one remaining view must
/// never both succeed. Everything else may be ordinary read-modify-write.
#[async_trait]
pub trait VaultStore: Send + Sync {
    /// Insert a new record. Fails with `StateConflict` if the id exists.
    async fn insert(&self, record: VaultRecord) -> CinderResult<()>;

    /// Fetch a record by id.
    async fn get(&self, vault_id: &str) -> CinderResult<Option<VaultRecord>>;

    /// Apply `mutate` to the record and persist the result, returning the
    /// updated record. `None` if the vault does not exist. Not safe for
    /// counter mutations; use the atomic primitives for those.
    async fn update(&self, vault_id: &str, mutate: Mutation<'_>)
        -> CinderResult<Option<VaultRecord>>;

    /// Atomically: if `remaining_views > 0 && !is_deleted`, decrement
    /// `remaining_views` by 1 and return the updated record. `None` when
    /// the precondition fails (including a missing vault): a no-op,
    /// never an error.
    async fn consume_view(&self, vault_id: &str) -> CinderResult<Option<VaultRecord>>;

    /// Atomically increment `failed_attempts`, unconditionally: lockout
    /// tracking applies even to otherwise inaccessible vaults. `None` if
    /// the vault does not exist.
    async fn record_failed_attempt(&self, vault_id: &str) -> CinderResult<Option<VaultRecord>>;

    /// Delete the record outright. Idempotent.
    async fn remove(&self, vault_id: &str) -> CinderResult<()>;

    /// Records the reconciler should sweep at `now`: expired,
    /// soft-deleted, failed uploads, and pending uploads older than
    /// `pending_abandon_secs`.
    async fn list_sweepable(
        &self,
        now: u64,
        pending_abandon_secs: u64,
    ) -> CinderResult<Vec<VaultRecord>>;
}

/// In-process implementation backed by a `RwLock<HashMap>`.
///
/// The write guard held across check-and-decrement is what makes
/// `consume_view` a single conditional update here; a backend-backed
/// implementation uses its own compare-and-swap instead.
#[derive(Default)]
pub struct MemoryVaultStore {
    records: RwLock<HashMap<String, VaultRecord>>,
}

impl MemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, VaultRecord>> {
        self.records.write().expect("vault store lock poisoned")
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, VaultRecord>> {
        self.records.read().expect("vault store lock poisoned")
    }
}

#[async_trait]
impl VaultStore for MemoryVaultStore {
    async fn insert(&self, record: VaultRecord) -> CinderResult<()> {
        let mut records = self.write();
        if records.contains_key(&record.vault_id) {
            return Err(CinderError::StateConflict(format!(
                "vault already exists: {}",
                record.vault_id
            )));
        }
        records.insert(record.vault_id.clone(), record);
        Ok(())
    }

    async fn get(&self, vault_id: &str) -> CinderResult<Option<VaultRecord>> {
        Ok(self.read().get(vault_id).cloned())
    }

    async fn update(
        &self,
        vault_id: &str,
        mutate: Mutation<'_>,
    ) -> CinderResult<Option<VaultRecord>> {
        let mut records = self.write();
        match records.get_mut(vault_id) {
            Some(record) => {
                mutate(record)?;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn consume_view(&self, vault_id: &str) -> CinderResult<Option<VaultRecord>> {
        let mut records = self.write();
        match records.get_mut(vault_id) {
            Some(record) if record.remaining_views > 0 && !record.is_deleted => {
                record.remaining_views -= 1;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_failed_attempt(&self, vault_id: &str) -> CinderResult<Option<VaultRecord>> {
        let mut records = self.write();
        match records.get_mut(vault_id) {
            Some(record) => {
                record.failed_attempts = record.failed_attempts.saturating_add(1);
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, vault_id: &str) -> CinderResult<()> {
        self.write().remove(vault_id);
        Ok(())
    }

    async fn list_sweepable(
        &self,
        now: u64,
        pending_abandon_secs: u64,
    ) -> CinderResult<Vec<VaultRecord>> {
        let records = self.read();
        Ok(records
            .values()
            .filter(|r| {
                r.expires_at <= now
                    || r.is_deleted
                    || r.upload_status == UploadStatus::Failed
                    || (r.upload_status == UploadStatus::Pending
                        && r.created_at + pending_abandon_secs <= now)
            })
            .cloned()
            .collect())
    }
}
