//! Upload Orchestrator - presigned multipart uploads straight to object storage
//!
//! Clients upload large objects directly to an S3-compatible backend using
//! per-part presigned URLs, while this service keeps authority over naming,
//! session bookkeeping and cleanup of abandoned uploads.

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod orchestrator;
pub mod planner;
pub mod reclaimer;
pub mod registry;
pub mod session;

pub use error::UploadError;
pub use orchestrator::{AbortOutcome, InitUploadRequest, UploadOrchestrator};
