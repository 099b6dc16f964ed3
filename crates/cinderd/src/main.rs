//! cinderd: Cinder vault daemon
//!
//! Usage:
//!   cinderd [--config /etc/cinder/config.toml]
//!
//! Serves the vault wire API, runs the cleanup reconciler on an
//! interval, and exposes Prometheus metrics. The server never holds key
//! material: it stores ciphertext, enforces policy, and nothing else.

mod http;
mod metrics;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};

use cinder_access::{AccessController, Reconciler, ServerSecret};
use cinder_core::config::CinderConfig;
use cinder_store::{BlobStore, MemoryVaultStore};

#[derive(Parser, Debug)]
#[command(name = "cinderd", version, about = "Cinder vault daemon")]
struct Cli {
    /// Path to cinder.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "CINDER_CONFIG",
        default_value = "/etc/cinder/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CINDER_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "CINDER_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, &cli.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "cinderd starting"
    );

    let config = load_config(&cli.config).await?;

    // Server secret: stable across restarts when provided, ephemeral
    // otherwise (existing sessions and metadata tags die on restart)
    let secret = match std::env::var("CINDER_SECRET") {
        Ok(hex_secret) => {
            let bytes: [u8; 32] = hex::decode(hex_secret.trim())
                .ok()
                .and_then(|b| b.try_into().ok())
                .context("CINDER_SECRET must be 32 bytes hex")?;
            ServerSecret::from_bytes(bytes)
        }
        Err(_) => {
            warn!("CINDER_SECRET not set (using an ephemeral secret)");
            ServerSecret::generate()
        }
    };

    // Blob store: S3 when credentials are present, in-memory otherwise
    let blobs = match (
        std::env::var("AWS_ACCESS_KEY_ID").or_else(|_| std::env::var("CINDER_ACCESS_KEY_ID")),
        std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("CINDER_SECRET_ACCESS_KEY")),
    ) {
        (Ok(access_key), Ok(secret_key)) => {
            let store = BlobStore::from_config(&config.storage, &access_key, &secret_key)
                .context("building blob store")?;
            info!(endpoint = %config.storage.endpoint, bucket = %config.storage.bucket, "blob store: S3");
            store
        }
        _ => {
            warn!("S3 credentials not set, using in-memory blob store (development only)");
            BlobStore::memory()
        }
    };

    let store = Arc::new(MemoryVaultStore::new());
    let controller = Arc::new(AccessController::new(
        store.clone(),
        blobs.clone(),
        secret,
        config.vault.clone(),
    ));

    // Metrics endpoint
    let mut registry = prometheus_client::registry::Registry::default();
    let daemon_metrics = metrics::DaemonMetrics::new(&mut registry);
    if let Some(metrics_addr) = config.daemon.metrics_addr.clone() {
        let registry = Arc::new(Mutex::new(registry));
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(metrics_addr, registry).await {
                warn!("metrics server exited: {e}");
            }
        });
    }

    // Cleanup reconciler: once at startup, then on the configured interval
    let reconciler = Arc::new(Reconciler::new(
        store,
        blobs,
        config.vault.pending_abandon_secs,
    ));
    let sweep_interval = std::time::Duration::from_secs(config.vault.sweep_interval_secs.max(1));
    {
        let reconciler = reconciler.clone();
        tokio::spawn(async move {
            reconciler.run_interval(sweep_interval).await;
        });
    }

    // Wire API
    let app = http::router(http::AppState {
        controller,
        metrics: daemon_metrics,
    });
    let listener = tokio::net::TcpListener::bind(&config.daemon.listen)
        .await
        .with_context(|| format!("binding {}", config.daemon.listen))?;
    info!(addr = %config.daemon.listen, "vault API listening");

    axum::serve(listener, app).await.context("serving vault API")
}

async fn load_config(path: &PathBuf) -> Result<CinderConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    } else {
        warn!("config file not found: {} (using defaults)", path.display());
        Ok(CinderConfig::default())
    }
}


fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
