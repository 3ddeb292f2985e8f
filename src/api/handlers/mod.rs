//! HTTP request handlers
//!
//! Split into submodules by domain:
//! - `uploads`: init, complete and abort of presigned multipart uploads
//! - `status`: health check

mod status;
mod uploads;

use super::errors::ApiError;
use crate::orchestrator::UploadOrchestrator;
use std::sync::Arc;

pub use status::{health_check, HealthResponse};
pub use uploads::{
    abort_upload, complete_upload, init_upload, CompleteUploadBody, InitUploadBody,
};

/// Application state shared across handlers
pub struct AppState {
    pub orchestrator: Arc<UploadOrchestrator>,
    /// Backend label reported by /health
    pub backend: &'static str,
}
