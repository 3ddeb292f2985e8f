//! Upload lifecycle handlers: InitUpload, CompleteUpload, AbortUpload.

use super::{ApiError, AppState};
use crate::orchestrator::{AbortOutcome, InitUploadRequest};
use crate::session::{CompletedPart, CompletedUpload, InitiatedUpload, OwnerContext, UploadHandle};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Body of POST /uploads
#[derive(Debug, Deserialize)]
pub struct InitUploadBody {
    pub key: String,
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub owner: OwnerContext,
}

/// Body of POST /uploads/{handle}/complete
#[derive(Debug, Deserialize)]
pub struct CompleteUploadBody {
    pub parts: Vec<CompletedPart>,
}

/// POST /uploads (InitUpload)
#[instrument(skip(state, body))]
pub async fn init_upload(
    State(state): State<Arc<AppState>>,
    body: Result<Json<InitUploadBody>, JsonRejection>,
) -> Result<(StatusCode, Json<InitiatedUpload>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::MalformedBody(e.body_text()))?;

    let content_type = body
        .content_type
        .filter(|ct| !ct.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let initiated = state
        .orchestrator
        .init_upload(InitUploadRequest {
            key: body.key,
            size: body.size,
            content_type,
            owner: body.owner,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(initiated)))
}

/// POST /uploads/{handle}/complete (CompleteUpload)
#[instrument(skip(state, body))]
pub async fn complete_upload(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<String>,
    body: Result<Json<CompleteUploadBody>, JsonRejection>,
) -> Result<Json<CompletedUpload>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::MalformedBody(e.body_text()))?;
    let completed = state
        .orchestrator
        .complete_upload(&UploadHandle::from(handle), body.parts)
        .await?;
    Ok(Json(completed))
}

/// DELETE /uploads/{handle} (AbortUpload)
///
/// Always 204: abort is idempotent and backend failures are not surfaced.
#[instrument(skip(state))]
pub async fn abort_upload(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<String>,
) -> StatusCode {
    let outcome = state
        .orchestrator
        .abort_upload(&UploadHandle::from(handle))
        .await;
    if outcome == AbortOutcome::Unknown {
        debug!("Abort was a no-op");
    }
    StatusCode::NO_CONTENT
}
