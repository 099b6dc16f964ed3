//! Ciphertext blob store: OpenDAL operator + bounded timeouts
//!
//! Chunks live at `vaults/{vault_id}/chunk-{index}`. The store is
//! content-agnostic: it only ever holds ciphertext and never needs to
//! interpret it. Every operation is bounded by a timeout, past which the
//! caller sees a retryable `StorageUnavailable`.

use std::time::Duration;

use anyhow::{Context, Result};
use cinder_core::config::StorageConfig;
use cinder_core::{CinderError, CinderResult};
use opendal::Operator;

/// Blob key for a vault chunk.
pub fn chunk_key(vault_id: &str, index: u32) -> String {
    format!("vaults/{vault_id}/chunk-{index}")
}

/// Prefix under which all of a vault's blobs live.
pub fn vault_prefix(vault_id: &str) -> String {
    format!("vaults/{vault_id}/")
}

/// Timeout-bounded byte store over an OpenDAL operator.
#[derive(Clone, Debug)]
pub struct BlobStore {
    op: Operator,
    timeout: Duration,
}

impl BlobStore {
    pub fn new(op: Operator, timeout: Duration) -> Self {
        Self { op, timeout }
    }

    /// In-memory store for tests and single-process development.
    pub fn memory() -> Self {
        let op = Operator::new(opendal::services::Memory::default())
            .expect("memory operator is infallible")
            .finish();
        Self::new(op, Duration::from_secs(5))
    }

    /// S3-backed store from daemon config + credentials.
    ///
    /// Uses path-style addressing (default in opendal 0.55), required by
    /// SeaweedFS and MinIO.
    pub fn from_config(
        cfg: &StorageConfig,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Result<Self> {
        if cfg.endpoint.starts_with("http://") {
            if cfg.enforce_tls {
                anyhow::bail!(
                    "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                     Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                    cfg.endpoint
                );
            }
            tracing::warn!(
                endpoint = %cfg.endpoint,
                "S3 endpoint uses plaintext HTTP — credentials are transmitted unencrypted"
            );
        }

        let builder = opendal::services::S3::default()
            .endpoint(&cfg.endpoint)
            .region(&cfg.region)
            .bucket(&cfg.bucket)
            .access_key_id(access_key_id)
            .secret_access_key(secret_access_key);

        let op = Operator::new(builder)
            .context("creating OpenDAL S3 operator")?
            .layer(opendal::layers::LoggingLayer::default())
            .layer(
                opendal::layers::RetryLayer::new()
                    .with_max_times(5)
                    .with_jitter(),
            )
            .finish();

        Ok(Self::new(op, Duration::from_secs(cfg.op_timeout_secs)))
    }

    /// Write `bytes` at `key`, replacing any existing blob.
    pub async fn put(&self, key: &str, bytes: Vec<u8>) -> CinderResult<()> {
        self.bounded(key, self.op.write(key, bytes)).await?;
        Ok(())
    }

    /// Read the blob at `key` in full.
    pub async fn get(&self, key: &str) -> CinderResult<Vec<u8>> {
        let buffer = self.bounded(key, self.op.read(key)).await?;
        Ok(buffer.to_bytes().to_vec())
    }

    /// Delete the blob at `key`. Deleting a missing blob is not an error.
    pub async fn delete(&self, key: &str) -> CinderResult<()> {
        match self.bounded(key, self.op.delete(key)).await {
            Ok(()) => Ok(()),
            Err(CinderError::StorageUnavailable(msg)) if msg.contains("NotFound") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn bounded<T>(
        &self,
        key: &str,
        fut: impl std::future::Future<Output = opendal::Result<T>>,
    ) -> CinderResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CinderError::StorageUnavailable(format!("{key}: {e}"))),
            Err(_) => Err(CinderError::StorageUnavailable(format!(
                "{key}: timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
