//! Object store gateway trait definitions

use crate::session::CompletedPart;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving the backend's multipart protocol
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Multipart upload not found: {0}")]
    NoSuchUpload(String),

    #[error("Presign error: {0}")]
    Presign(String),

    #[error("Backend call timed out: {0}")]
    Timeout(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Gateway error: {0}")]
    Other(String),
}

/// A multipart upload as reported by the backend's own listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSession {
    pub key: String,
    pub remote_session_id: String,
    pub initiated_at: DateTime<Utc>,
}

/// The multipart-upload capability the orchestrator depends on.
///
/// Phrased against the S3 multipart protocol; any backend that can open,
/// presign, finalize, abort and list multipart sessions fits.
///
/// This trait is object-safe and can be used with `Arc<dyn ObjectStoreGateway>`.
#[async_trait]
pub trait ObjectStoreGateway: Send + Sync {
    /// Open a remote multipart session, returning its backend id.
    async fn create_session(&self, key: &str, content_type: &str) -> Result<String, GatewayError>;

    /// Presign a PUT URL for one part of an open session.
    async fn presign_part_upload(
        &self,
        key: &str,
        remote_session_id: &str,
        part_number: u32,
        validity: Duration,
    ) -> Result<String, GatewayError>;

    /// Finalize a session. `parts` must already be sorted by part number.
    async fn complete_session(
        &self,
        key: &str,
        remote_session_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), GatewayError>;

    /// Abort a session, releasing any uploaded part data.
    async fn abort_session(&self, key: &str, remote_session_id: &str) -> Result<(), GatewayError>;

    /// List every multipart session currently open on the backend.
    async fn list_open_sessions(&self) -> Result<Vec<RemoteSession>, GatewayError>;

    /// URL under which a finalized object can be retrieved.
    fn object_url(&self, key: &str) -> String;
}
