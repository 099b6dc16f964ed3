//! Prometheus /metrics + health endpoints
//!
//! Endpoints:
//!   GET /metrics  — Prometheus text format
//!   GET /healthz  — Liveness probe (always 200 if process is running)

use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::{encoding::text::encode, metrics::counter::Counter, registry::Registry};

/// Daemon-wide counters.
#[derive(Clone, Default)]
pub struct DaemonMetrics {
    pub vaults_created: Counter,
    pub views_consumed: Counter,
    pub failed_attempts: Counter,
    pub vaults_deleted: Counter,
}

impl DaemonMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = DaemonMetrics::default();
        registry.register(
            "cinder_vaults_created_total",
            "Vaults registered",
            metrics.vaults_created.clone(),
        );
        registry.register(
            "cinder_views_consumed_total",
            "Views granted (and burned)",
            metrics.views_consumed.clone(),
        );
        registry.register(
            "cinder_failed_attempts_total",
            "Failed password/decrypt attempts reported",
            metrics.failed_attempts.clone(),
        );
        registry.register(
            "cinder_vaults_deleted_total",
            "Owner-token vault deletions",
            metrics.vaults_deleted.clone(),
        );
        metrics
    }
}

/// Serve metrics and liveness on `addr` (e.g. "127.0.0.1:9100").
pub async fn serve(addr: String, registry: Arc<Mutex<Registry>>) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(registry);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

async fn metrics_handler(State(registry): State<Arc<Mutex<Registry>>>) -> impl IntoResponse {
    let mut body = String::new();
    let guard = registry.lock().expect("registry lock poisoned");
    match encode(&mut body, &guard) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
