use serde::{Deserialize, Serialize};

/// Top-level daemon configuration (loaded from cinder.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CinderConfig {
    pub daemon: DaemonConfig,
    pub storage: StorageConfig,
    pub vault: VaultConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// HTTP listen address (default: 127.0.0.1:8420)
    pub listen: String,
    /// Prometheus metrics endpoint (default: 127.0.0.1:9100)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint for ciphertext blobs
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Enforce HTTPS for S3 connections
    pub enforce_tls: bool,
    /// Per-operation timeout in seconds; past it callers see a
    /// retryable transient failure
    pub op_timeout_secs: u64,
}

/// Vault policy limits enforced at init time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Largest accepted total ciphertext size in bytes
    pub max_total_size: u64,
    /// Largest accepted single chunk in bytes
    pub max_chunk_size: u64,
    /// Most chunks a single vault may declare
    pub max_chunks: u32,
    /// Default view quota when the sender specifies none
    pub default_max_views: u32,
    /// Upper bound on the view quota
    pub max_views: u32,
    /// Default lifetime in seconds (24h)
    pub default_expiry_secs: u64,
    /// Upper bound on lifetime in seconds (7 days)
    pub max_expiry_secs: u64,
    /// Failed-attempt lockout threshold default
    pub default_max_failed_attempts: u32,
    /// Capability token lifetime after a granted view
    pub session_ttl_secs: u64,
    /// Age past which a still-pending upload is considered abandoned
    pub pending_abandon_secs: u64,
    /// Reconciler sweep interval
    pub sweep_interval_secs: u64,
    /// Lowest PBKDF2 iteration count accepted from senders
    pub min_pbkdf2_iterations: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8420".into(),
            metrics_addr: Some("127.0.0.1:9100".into()),
            log_level: "info".into(),
            log_format: "json".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "cinder".into(),
            enforce_tls: false,
            op_timeout_secs: 10,
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            max_total_size: 256 * 1024 * 1024,
            max_chunk_size: 8 * 1024 * 1024,
            max_chunks: 4096,
            default_max_views: 1,
            max_views: 100,
            default_expiry_secs: 24 * 3600,
            max_expiry_secs: 7 * 24 * 3600,
            default_max_failed_attempts: 5,
            session_ttl_secs: 300,
            pending_abandon_secs: 3600,
            sweep_interval_secs: 300,
            min_pbkdf2_iterations: 100_000,
        }
    }
}
