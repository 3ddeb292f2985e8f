//! Presigned multipart upload orchestration
//!
//! The orchestrator opens a backend multipart session, hands the client one
//! presigned URL per part, and later finalizes or aborts the session. Object
//! bytes never pass through this process.
//!
//! Every resolution path claims the session with a single atomic
//! [`SessionRegistry::take`]; only the winner talks to the backend.

use crate::config::UploadSettings;
use crate::error::UploadError;
use crate::gateway::{GatewayError, ObjectStoreGateway};
use crate::metrics::Metrics;
use crate::planner::PartPlanner;
use crate::reclaimer::Reclaimer;
use crate::registry::SessionRegistry;
use crate::session::{
    CompletedPart, CompletedUpload, InitiatedUpload, OwnerContext, PartUrl, UploadHandle,
    UploadSession,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Parameters of an InitUpload call. The key is expected to be resolved and
/// sanitized by the caller.
#[derive(Debug, Clone)]
pub struct InitUploadRequest {
    pub key: String,
    pub size: u64,
    pub content_type: String,
    pub owner: OwnerContext,
}

/// What an abort call found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortOutcome {
    /// The session was pending and this call resolved it.
    Aborted,
    /// No pending session under that handle; nothing was done.
    Unknown,
}

pub struct UploadOrchestrator {
    gateway: Arc<dyn ObjectStoreGateway>,
    registry: Arc<SessionRegistry>,
    planner: PartPlanner,
    settings: UploadSettings,
    metrics: Metrics,
    started_at: DateTime<Utc>,
}

impl UploadOrchestrator {
    pub fn new(gateway: Arc<dyn ObjectStoreGateway>, settings: UploadSettings) -> Self {
        Self::with_metrics(gateway, settings, Metrics::new())
    }

    pub fn with_metrics(
        gateway: Arc<dyn ObjectStoreGateway>,
        settings: UploadSettings,
        metrics: Metrics,
    ) -> Self {
        Self {
            gateway,
            registry: Arc::new(SessionRegistry::new()),
            planner: PartPlanner::new(&settings),
            settings,
            metrics,
            started_at: Utc::now(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn gateway(&self) -> &Arc<dyn ObjectStoreGateway> {
        &self.gateway
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// When this orchestrator was built. Every remote session it opens is
    /// initiated at or after this instant.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// A reclaimer sharing this orchestrator's registry and gateway.
    pub fn reclaimer(&self) -> Reclaimer {
        Reclaimer::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.gateway),
            &self.settings,
            self.metrics.clone(),
            self.started_at,
        )
    }

    /// Open a multipart session and presign a PUT URL for every part.
    ///
    /// Nothing is registered unless every step succeeds. If presigning fails
    /// after the backend session was opened, that session is aborted before
    /// the error is returned.
    #[instrument(skip(self, request), fields(key = %request.key, size = request.size))]
    pub async fn init_upload(
        &self,
        request: InitUploadRequest,
    ) -> Result<InitiatedUpload, UploadError> {
        if request.key.trim().is_empty() {
            return Err(UploadError::InvalidArgument(
                "object key must not be empty".to_string(),
            ));
        }
        if request.size == 0 {
            return Err(UploadError::InvalidArgument(
                "size must be greater than zero".to_string(),
            ));
        }
        if request.size > self.settings.max_object_size {
            return Err(UploadError::EntityTooLarge {
                size: request.size,
                max: self.settings.max_object_size,
            });
        }
        if request.content_type.trim().is_empty() {
            return Err(UploadError::InvalidArgument(
                "content type must not be empty".to_string(),
            ));
        }

        let plan = self.planner.plan(request.size);

        let remote_session_id = self
            .gateway
            .create_session(&request.key, &request.content_type)
            .await
            .inspect_err(|_| self.metrics.backend_error("create"))?;

        let parts = match self.presign_parts(&request.key, &remote_session_id, plan.part_count).await {
            Ok(parts) => parts,
            Err(e) => {
                self.metrics.backend_error("presign");
                warn!(
                    "Presigning failed for {} ({}), aborting remote session",
                    request.key, e
                );
                let _ = self
                    .abort_remote(&request.key, &remote_session_id, "presign failure")
                    .await;
                return Err(e.into());
            }
        };

        let created_at = Utc::now();
        let handle = UploadHandle::generate();
        let session = UploadSession {
            handle: handle.clone(),
            object_key: request.key.clone(),
            remote_session_id,
            total_size: request.size,
            content_type: request.content_type,
            plan,
            owner: request.owner,
            created_at,
        };
        self.registry.insert(session);

        self.metrics.sessions_initiated_total.inc();
        self.metrics.init_parts.observe(plan.part_count as f64);
        info!(
            "InitUpload {} handle={} parts={}x{}",
            request.key, handle, plan.part_count, plan.part_size
        );

        let expires_at = created_at
            + chrono::Duration::from_std(self.settings.presign_expiry)
                .unwrap_or(chrono::Duration::MAX);

        Ok(InitiatedUpload {
            handle,
            key: request.key,
            part_size: plan.part_size,
            part_count: plan.part_count,
            parts,
            expires_at,
        })
    }

    async fn presign_parts(
        &self,
        key: &str,
        remote_session_id: &str,
        part_count: u32,
    ) -> Result<Vec<PartUrl>, GatewayError> {
        let mut parts = Vec::with_capacity(part_count as usize);
        for part_number in 1..=part_count {
            let url = self
                .gateway
                .presign_part_upload(
                    key,
                    remote_session_id,
                    part_number,
                    self.settings.presign_expiry,
                )
                .await?;
            parts.push(PartUrl { part_number, url });
        }
        Ok(parts)
    }

    /// Finalize an upload from the parts the client reports.
    ///
    /// A part list that does not match the plan is rejected before the handle
    /// is consumed, so the client can retry. An empty list consumes the handle
    /// and aborts the backend session.
    #[instrument(skip(self, parts), fields(handle = %handle, parts = parts.len()))]
    pub async fn complete_upload(
        &self,
        handle: &UploadHandle,
        mut parts: Vec<CompletedPart>,
    ) -> Result<CompletedUpload, UploadError> {
        if !parts.is_empty() {
            let pending = self
                .registry
                .get(handle)
                .ok_or_else(|| UploadError::UnknownUpload(handle.clone()))?;
            validate_parts(&parts, pending.plan.part_count)?;
        }

        let session = self
            .registry
            .take(handle)
            .ok_or_else(|| UploadError::UnknownUpload(handle.clone()))?;

        if parts.is_empty() {
            warn!(
                "CompleteUpload {} with no parts, aborting remote session",
                session.object_key
            );
            if self
                .abort_remote(&session.object_key, &session.remote_session_id, "empty part list")
                .await
                .is_ok()
            {
                self.metrics.sessions_aborted_total.inc();
            }
            return Err(UploadError::EmptyPartList);
        }

        parts.sort_by_key(|p| p.part_number);

        if let Err(e) = self
            .gateway
            .complete_session(&session.object_key, &session.remote_session_id, &parts)
            .await
        {
            self.metrics.backend_error("complete");
            warn!(
                "Finalizing {} failed ({}), releasing remote session",
                session.object_key, e
            );
            let _ = self
                .abort_remote(&session.object_key, &session.remote_session_id, "finalize failure")
                .await;
            return Err(e.into());
        }

        self.metrics.sessions_completed_total.inc();
        info!(
            "CompleteUpload {} handle={} ({} bytes, {} parts)",
            session.object_key,
            handle,
            session.total_size,
            parts.len()
        );

        Ok(CompletedUpload {
            url: self.gateway.object_url(&session.object_key),
            key: session.object_key,
            size: session.total_size,
            content_type: session.content_type,
            owner: session.owner,
        })
    }

    /// Abort a pending upload. Never fails: an unknown handle is reported via
    /// [`AbortOutcome::Unknown`] and backend failures are logged.
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn abort_upload(&self, handle: &UploadHandle) -> AbortOutcome {
        let Some(session) = self.registry.take(handle) else {
            warn!("AbortUpload for unknown or already-resolved handle {}", handle);
            return AbortOutcome::Unknown;
        };

        if self
            .abort_remote(&session.object_key, &session.remote_session_id, "client abort")
            .await
            .is_ok()
        {
            self.metrics.sessions_aborted_total.inc();
        }
        info!("AbortUpload {} handle={}", session.object_key, handle);
        AbortOutcome::Aborted
    }

    /// Best-effort backend abort. A session the backend no longer knows
    /// counts as released.
    async fn abort_remote(
        &self,
        key: &str,
        remote_session_id: &str,
        reason: &str,
    ) -> Result<(), GatewayError> {
        match self.gateway.abort_session(key, remote_session_id).await {
            Ok(()) => {
                debug!("Aborted remote session {} for {} ({})", remote_session_id, key, reason);
                Ok(())
            }
            Err(GatewayError::NoSuchUpload(_)) => {
                debug!("Remote session {} for {} already gone", remote_session_id, key);
                Ok(())
            }
            Err(e) => {
                self.metrics.backend_error("abort");
                warn!(
                    "Failed to abort remote session {} for {} ({}): {}",
                    remote_session_id, key, reason, e
                );
                Err(e)
            }
        }
    }
}

/// The reported parts must be exactly `1..=part_count`, each once.
fn validate_parts(parts: &[CompletedPart], part_count: u32) -> Result<(), UploadError> {
    let mut seen = HashSet::with_capacity(parts.len());
    for part in parts {
        if part.part_number == 0 || part.part_number > part_count {
            return Err(UploadError::InvalidPart(format!(
                "part number {} outside 1..={}",
                part.part_number, part_count
            )));
        }
        if part.etag.trim_matches('"').is_empty() {
            return Err(UploadError::InvalidPart(format!(
                "part {} has an empty ETag",
                part.part_number
            )));
        }
        if !seen.insert(part.part_number) {
            return Err(UploadError::InvalidPart(format!(
                "part {} reported more than once",
                part.part_number
            )));
        }
    }
    if seen.len() != part_count as usize {
        return Err(UploadError::InvalidPart(format!(
            "expected {} parts, got {}",
            part_count,
            seen.len()
        )));
    }
    Ok(())
}
