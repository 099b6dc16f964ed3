//! HTTP wire layer: thin handlers over the access controller
//!
//! Every route maps a request to one controller call and a controller
//! error to a status code. No policy or crypto decisions are made here.
//! The decryption key is never part of any request or response; denied
//! and nonexistent vaults are both 404.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use bytes::Bytes;
use cinder_access::{AccessController, InitVaultRequest};
use cinder_core::CinderError;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::metrics::DaemonMetrics;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AccessController>,
    pub metrics: DaemonMetrics,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/vaults", post(init_vault))
        .route("/v1/vaults/{id}/chunks/{index}", put(upload_chunk))
        .route("/v1/vaults/{id}/finalize", post(finalize))
        .route("/v1/vaults/{id}/abort", post(abort))
        .route("/v1/vaults/{id}", get(get_metadata))
        .route("/v1/vaults/{id}/access", post(access))
        .route("/v1/vaults/{id}/chunks/{index}", get(download_chunk))
        .route("/v1/vaults/{id}/failed-attempt", post(failed_attempt))
        .route("/v1/vaults/{id}", delete(delete_vault))
        .with_state(state)
}

/// Map the error taxonomy onto status codes. AccessDenied is 404 on
/// purpose: an inaccessible vault must look exactly like a missing one.
fn error_response(e: CinderError) -> Response {
    let (status, code) = match &e {
        CinderError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        CinderError::AccessDenied => (StatusCode::NOT_FOUND, "ACCESS_DENIED"),
        CinderError::NoViewsRemaining => (StatusCode::GONE, "NO_VIEWS_REMAINING"),
        CinderError::Integrity(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INTEGRITY_ERROR"),
        CinderError::StateConflict(_) => (StatusCode::CONFLICT, "STATE_CONFLICT"),
        CinderError::StorageUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")
        }
        CinderError::Io(_) | CinderError::Other(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
        }
    };
    debug!(code, "request failed: {e}");
    (status, Json(json!({ "error": code }))).into_response()
}

macro_rules! try_or_respond {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => return error_response(e),
        }
    };
}

async fn init_vault(
    State(state): State<AppState>,
    Json(req): Json<InitVaultRequest>,
) -> Response {
    let resp = try_or_respond!(state.controller.init_vault(req).await);
    state.metrics.vaults_created.inc();
    (StatusCode::CREATED, Json(resp)).into_response()
}

async fn upload_chunk(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u32)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(hash) = headers.get("x-chunk-hash").and_then(|v| v.to_str().ok()) else {
        return error_response(CinderError::Validation("missing x-chunk-hash header".into()));
    };
    let resp = try_or_respond!(state.controller.upload_chunk(&id, index, &body, hash).await);
    Json(resp).into_response()
}

async fn finalize(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let summary = try_or_respond!(state.controller.finalize(&id).await);
    Json(summary).into_response()
}

async fn abort(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    try_or_respond!(state.controller.abort(&id).await);
    Json(json!({ "status": "aborted" })).into_response()
}

async fn get_metadata(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let summary = try_or_respond!(state.controller.get_metadata(&id).await);
    Json(summary).into_response()
}

async fn access(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let grant = try_or_respond!(state.controller.grant_access(&id).await);
    state.metrics.views_consumed.inc();
    Json(grant).into_response()
}

async fn download_chunk(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u32)>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = headers.get("x-session-token").and_then(|v| v.to_str().ok()) else {
        return error_response(CinderError::AccessDenied);
    };
    let (bytes, hash) =
        try_or_respond!(state.controller.download_chunk(&id, index, token).await);
    (
        StatusCode::OK,
        [
            ("content-type", "application/octet-stream".to_string()),
            ("x-content-hash", hash),
        ],
        bytes,
    )
        .into_response()
}

async fn failed_attempt(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let resp = try_or_respond!(state.controller.report_failed_attempt(&id).await);
    state.metrics.failed_attempts.inc();
    Json(resp).into_response()
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    delete_token: String,
}

async fn delete_vault(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DeleteRequest>,
) -> Response {
    try_or_respond!(state.controller.delete_vault(&id, &req.delete_token).await);
    state.metrics.vaults_deleted.inc();
    Json(json!({ "status": "deleted" })).into_response()
}
