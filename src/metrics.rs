//! Prometheus metrics for the upload orchestrator.
//!
//! All metric types use atomics internally (no locks on the hot path).
//! The `Metrics` struct is `Clone`-cheap (Arc-based registry + Arc-based collectors).

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder, TEXT_FORMAT,
};
use std::sync::Arc;
use std::time::Instant;

use crate::api::AppState;

/// All Prometheus metrics for the upload orchestrator.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // -- Process & Build --
    pub process_start_time_seconds: Gauge,

    // -- HTTP Requests --
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,

    // -- Upload lifecycle --
    pub sessions_initiated_total: IntCounter,
    pub sessions_completed_total: IntCounter,
    pub sessions_aborted_total: IntCounter,
    pub sessions_reclaimed_total: IntCounterVec,
    pub sessions_pending: IntGauge,
    pub init_parts: Histogram,

    // -- Backend --
    pub backend_errors_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        // -- Process & Build --
        let process_start_time_seconds =
            Gauge::new("process_start_time_seconds", "Start time of the process").unwrap();
        registry
            .register(Box::new(process_start_time_seconds.clone()))
            .unwrap();
        process_start_time_seconds.set(chrono::Utc::now().timestamp() as f64);

        // Register standard process metrics (RSS, CPU, open FDs on Linux)
        #[cfg(target_os = "linux")]
        {
            let pc = prometheus::process_collector::ProcessCollector::for_self();
            let _ = registry.register(Box::new(pc));
        }

        // -- HTTP Requests --
        let http_requests_total = IntCounterVec::new(
            Opts::new(
                "upload_http_requests_total",
                "Total HTTP requests by method, status, and operation",
            ),
            &["method", "status", "operation"],
        )
        .unwrap();
        registry
            .register(Box::new(http_requests_total.clone()))
            .unwrap();

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "upload_http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "operation"],
        )
        .unwrap();
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .unwrap();

        // -- Upload lifecycle --
        let sessions_initiated_total = IntCounter::new(
            "upload_sessions_initiated_total",
            "Multipart upload sessions opened",
        )
        .unwrap();
        registry
            .register(Box::new(sessions_initiated_total.clone()))
            .unwrap();

        let sessions_completed_total = IntCounter::new(
            "upload_sessions_completed_total",
            "Multipart upload sessions finalized",
        )
        .unwrap();
        registry
            .register(Box::new(sessions_completed_total.clone()))
            .unwrap();

        let sessions_aborted_total = IntCounter::new(
            "upload_sessions_aborted_total",
            "Multipart upload sessions aborted on client request",
        )
        .unwrap();
        registry
            .register(Box::new(sessions_aborted_total.clone()))
            .unwrap();

        let sessions_reclaimed_total = IntCounterVec::new(
            Opts::new(
                "upload_sessions_reclaimed_total",
                "Expired multipart upload sessions aborted by a sweep",
            ),
            &["trigger"],
        )
        .unwrap();
        registry
            .register(Box::new(sessions_reclaimed_total.clone()))
            .unwrap();

        let sessions_pending = IntGauge::new(
            "upload_sessions_pending",
            "Upload sessions registered and not yet resolved",
        )
        .unwrap();
        registry
            .register(Box::new(sessions_pending.clone()))
            .unwrap();

        let init_parts = Histogram::with_opts(
            HistogramOpts::new("upload_init_parts", "Planned part count per upload")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 1000.0, 10000.0]),
        )
        .unwrap();
        registry.register(Box::new(init_parts.clone())).unwrap();

        // -- Backend --
        let backend_errors_total = IntCounterVec::new(
            Opts::new(
                "upload_backend_errors_total",
                "Failed object store calls by operation",
            ),
            &["operation"],
        )
        .unwrap();
        registry
            .register(Box::new(backend_errors_total.clone()))
            .unwrap();

        Self {
            registry,
            process_start_time_seconds,
            http_requests_total,
            http_request_duration_seconds,
            sessions_initiated_total,
            sessions_completed_total,
            sessions_aborted_total,
            sessions_reclaimed_total,
            sessions_pending,
            init_parts,
            backend_errors_total,
        }
    }

    pub fn backend_error(&self, operation: &str) {
        self.backend_errors_total
            .with_label_values(&[operation])
            .inc();
    }
}

/// Map a request to a low-cardinality operation label.
pub fn classify_operation(method: &str, path: &str) -> &'static str {
    match path {
        "/health" => return "health",
        "/metrics" => return "metrics",
        _ => {}
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        ("POST", ["uploads"]) => "init_upload",
        ("POST", ["uploads", _, "complete"]) => "complete_upload",
        ("DELETE", ["uploads", _]) => "abort_upload",
        _ => "unknown",
    }
}

/// Axum middleware that records HTTP request metrics.
pub async fn http_metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let metrics = state.orchestrator.metrics();

    let method = request.method().to_string();
    let operation = classify_operation(&method, request.uri().path());

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed().as_secs_f64();

    let status = response.status().as_u16().to_string();

    metrics
        .http_requests_total
        .with_label_values(&[&method, &status, operation])
        .inc();
    metrics
        .http_request_duration_seconds
        .with_label_values(&[&method, operation])
        .observe(duration);

    response
}

/// Handler for GET /metrics, returning Prometheus text format.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let metrics = state.orchestrator.metrics();
    metrics
        .sessions_pending
        .set(state.orchestrator.pending_count() as i64);

    let encoder = TextEncoder::new();
    let metric_families = metrics.registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (StatusCode::OK, [("content-type", TEXT_FORMAT)], buffer).into_response()
}
