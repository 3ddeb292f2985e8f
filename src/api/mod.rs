//! JSON HTTP API for the upload orchestrator

mod errors;
pub mod handlers;

pub use errors::ApiError;
pub use handlers::AppState;

use crate::metrics::{http_metrics_middleware, metrics_handler};
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use handlers::{abort_upload, complete_upload, health_check, init_upload};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the service router.
///
/// Routes:
///   POST   /uploads                   - InitUpload
///   POST   /uploads/{handle}/complete - CompleteUpload
///   DELETE /uploads/{handle}          - AbortUpload
///   GET    /health                    - health check
///   GET    /metrics                   - Prometheus metrics
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/uploads", post(init_upload))
        .route("/uploads/:handle/complete", post(complete_upload))
        .route("/uploads/:handle", delete(abort_upload))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            http_metrics_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
