//! API error types and JSON error responses

use crate::error::UploadError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced over HTTP
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Upload(#[from] UploadError),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MalformedBody(_) => "MalformedBody",
            ApiError::Upload(e) => match e {
                UploadError::InvalidArgument(_) => "InvalidArgument",
                UploadError::EntityTooLarge { .. } => "EntityTooLarge",
                UploadError::EmptyPartList => "EmptyPartList",
                UploadError::InvalidPart(_) => "InvalidPart",
                UploadError::UnknownUpload(_) => "NoSuchUpload",
                UploadError::Backend(_) => "BackendError",
            },
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Upload(e) => match e {
                UploadError::InvalidArgument(_)
                | UploadError::EmptyPartList
                | UploadError::InvalidPart(_) => StatusCode::BAD_REQUEST,
                UploadError::EntityTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                UploadError::UnknownUpload(_) => StatusCode::NOT_FOUND,
                UploadError::Backend(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
