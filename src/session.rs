//! Upload session data model
//!
//! An `UploadSession` is fully populated before it is registered and is never
//! mutated afterwards. The only state transition a session goes through is its
//! removal from the [`SessionRegistry`](crate::registry::SessionRegistry).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle the client uses to refer to a pending upload.
///
/// Distinct from the backend's multipart upload id, which never leaves the
/// orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadHandle(String);

impl UploadHandle {
    /// Generate a fresh random handle.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UploadHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UploadHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for UploadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-owned references carried through an upload untouched.
///
/// The orchestrator never interprets these; they are handed back verbatim in
/// the [`CompletedUpload`] so the caller can persist its own record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContext {
    pub folder: Option<String>,
    pub principal: Option<String>,
}

/// Part size and count for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartPlan {
    pub part_size: u64,
    pub part_count: u32,
}

/// One pending multipart upload.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub handle: UploadHandle,
    pub object_key: String,
    pub remote_session_id: String,
    pub total_size: u64,
    pub content_type: String,
    pub plan: PartPlan,
    pub owner: OwnerContext,
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    /// True once the session has lived longer than `ttl` as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: std::time::Duration) -> bool {
        let ttl = Duration::from_std(ttl).unwrap_or(Duration::MAX);
        now.signed_duration_since(self.created_at) > ttl
    }
}

/// A presigned URL for a single part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartUrl {
    pub part_number: u32,
    pub url: String,
}

/// A part reported by the client after it finished uploading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }

    /// ETag in the quoted form S3 expects on CompleteMultipartUpload.
    pub fn quoted_etag(&self) -> String {
        format!("\"{}\"", self.etag.trim_matches('"'))
    }
}

/// Result of InitUpload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatedUpload {
    pub handle: UploadHandle,
    pub key: String,
    pub part_size: u64,
    pub part_count: u32,
    pub parts: Vec<PartUrl>,
    pub expires_at: DateTime<Utc>,
}

/// Descriptor of a finalized object, handed back to the caller for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedUpload {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
    pub owner: OwnerContext,
}
