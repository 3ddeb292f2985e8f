//! Orchestrator error types

use crate::gateway::GatewayError;
use crate::session::UploadHandle;
use thiserror::Error;

/// Errors returned by the upload orchestrator
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Object too large: {size} bytes (max: {max} bytes)")]
    EntityTooLarge { size: u64, max: u64 },

    #[error("Completion requires at least one part")]
    EmptyPartList,

    #[error("Invalid part list: {0}")]
    InvalidPart(String),

    #[error("Unknown or already-resolved upload: {0}")]
    UnknownUpload(UploadHandle),

    #[error("Backend error: {0}")]
    Backend(#[from] GatewayError),
}

impl UploadError {
    /// True for the lost-race signal: the handle was never issued or was
    /// already completed, aborted or reclaimed.
    pub fn is_unknown_upload(&self) -> bool {
        matches!(self, UploadError::UnknownUpload(_))
    }

    /// True when the caller sent something unusable; no remote state changed
    /// except where noted on the operation.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            UploadError::InvalidArgument(_)
                | UploadError::EntityTooLarge { .. }
                | UploadError::EmptyPartList
                | UploadError::InvalidPart(_)
        )
    }
}
