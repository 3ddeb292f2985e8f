//! Health-check handler.

use super::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build_time: String,
    pub backend: String,
    pub pending_uploads: usize,
}

/// Health check handler
/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_time: env!("UPO_BUILD_TIME").to_string(),
        backend: state.backend.to_string(),
        pending_uploads: state.orchestrator.pending_count(),
    })
}
