//! Cleanup reconciler: periodic sweep of dead vaults and their blobs
//!
//! A correctness backstop, not the enforcement path: expiry and quota
//! are enforced synchronously by the access controller. The sweep
//! removes expired, soft-deleted, failed, and abandoned-pending vaults.
//! Blob deletes are best-effort (a leftover blob is a storage leak, not
//! a correctness violation); record delete errors propagate and the
//! sweep retries next interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cinder_core::{unix_now, CinderResult, VaultRecord};
use cinder_store::{BlobStore, VaultStore};
use tracing::{debug, info, warn};

/// Outcome of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Records removed
    pub swept: usize,
    /// Blob deletes that failed and were left for the next pass
    pub blob_failures: usize,
    /// True when the pass was skipped because another was running
    pub skipped: bool,
}

pub struct Reconciler {
    store: Arc<dyn VaultStore>,
    blobs: BlobStore,
    pending_abandon_secs: u64,
    running: AtomicBool,
}

impl Reconciler {
    pub fn new(store: Arc<dyn VaultStore>, blobs: BlobStore, pending_abandon_secs: u64) -> Self {
        Self {
            store,
            blobs,
            pending_abandon_secs,
            running: AtomicBool::new(false),
        }
    }

    /// One sweep pass at `now`. Safe to call concurrently with itself:
    /// an overlapping call short-circuits instead of double-sweeping.
    pub async fn run_once(&self, now: u64) -> CinderResult<SweepStats> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sweep already running, skipping");
            return Ok(SweepStats {
                skipped: true,
                ..SweepStats::default()
            });
        }

        let result = self.sweep(now).await;
        self.running.store(false, Ordering::Release);
        result
    }

    /// Sweep once at startup, then on a fixed interval, until cancelled
    /// by dropping the task.
    pub async fn run_interval(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.run_once(unix_now()).await {
                Ok(stats) if stats.swept > 0 => {
                    info!(
                        swept = stats.swept,
                        blob_failures = stats.blob_failures,
                        "sweep complete"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("sweep failed: {e}"),
            }
        }
    }

    async fn sweep(&self, now: u64) -> CinderResult<SweepStats> {
        let candidates = self
            .store
            .list_sweepable(now, self.pending_abandon_secs)
            .await?;

        let mut stats = SweepStats::default();
        for record in candidates {
            stats.blob_failures += self.delete_blobs(&record).await;
            self.store.remove(&record.vault_id).await?;
            stats.swept += 1;
            debug!(vault_id = %record.vault_id, "vault swept");
        }
        Ok(stats)
    }

    /// Independent per-blob deletes; one failure never aborts the rest.
    async fn delete_blobs(&self, record: &VaultRecord) -> usize {
        let mut failures = 0;
        for chunk in &record.chunks {
            if let Err(e) = self.blobs.delete(&chunk.blob_key).await {
                warn!(
                    vault_id = %record.vault_id,
                    blob_key = %chunk.blob_key,
                    "blob delete failed, will retry next sweep: {e}"
                );
                failures += 1;
            }
        }
        failures
    }
}
