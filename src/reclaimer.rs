//! Expiry sweeps for abandoned multipart uploads
//!
//! Two independent triggers:
//! - the startup sweep lists open sessions on the backend itself and aborts
//!   the stale ones, so fragments left behind by a previous process are
//!   released even though the registry starts empty;
//! - the periodic sweep claims expired registry entries with the same
//!   test-and-remove used by completion, then aborts their remote sessions.
//!
//! A failed abort is logged and counted; the sweep moves on to the next
//! candidate.

use crate::config::UploadSettings;
use crate::gateway::{GatewayError, ObjectStoreGateway, RemoteSession};
use crate::metrics::Metrics;
use crate::registry::SessionRegistry;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions looked at.
    pub examined: usize,
    /// Sessions this sweep claimed and released on the backend.
    pub aborted: usize,
    /// Stale sessions left alone because another caller resolved them first.
    pub skipped: usize,
    /// Backend aborts that failed.
    pub failed: usize,
}

pub struct Reclaimer {
    registry: Arc<SessionRegistry>,
    gateway: Arc<dyn ObjectStoreGateway>,
    ttl: Duration,
    interval: Duration,
    metrics: Metrics,
    /// Remote sessions initiated at or after this belong to the running
    /// process and are never touched by the startup sweep.
    started_at: DateTime<Utc>,
}

impl Reclaimer {
    /// Max concurrent backend aborts within one sweep.
    const MAX_CONCURRENT_ABORTS: usize = 16;

    pub fn new(
        registry: Arc<SessionRegistry>,
        gateway: Arc<dyn ObjectStoreGateway>,
        settings: &UploadSettings,
        metrics: Metrics,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            registry,
            gateway,
            ttl: settings.session_ttl,
            interval: settings.sweep_interval,
            metrics,
            started_at,
        }
    }

    /// Abort every backend session older than the TTL that predates this
    /// process. Sessions opened since start are left to completion, abort
    /// and the periodic sweep.
    pub async fn startup_sweep(&self) -> Result<SweepReport, GatewayError> {
        self.startup_sweep_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn startup_sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, GatewayError> {
        let open = self.gateway.list_open_sessions().await.inspect_err(|e| {
            self.metrics.backend_error("list");
            warn!("Startup sweep could not list open uploads: {}", e);
        })?;

        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let mut report = SweepReport {
            examined: open.len(),
            ..SweepReport::default()
        };

        let mut stale: Vec<RemoteSession> = Vec::new();
        for remote in open {
            if remote.initiated_at >= self.started_at
                || now.signed_duration_since(remote.initiated_at) <= ttl
            {
                continue;
            }
            // A live registry entry owns its remote session; claim it first.
            if let Some(handle) = self.registry.handle_for_remote(&remote.remote_session_id) {
                if self.registry.take(&handle).is_none() {
                    report.skipped += 1;
                    continue;
                }
            }
            stale.push(remote);
        }

        let (aborted, failed) = self.abort_all(stale, "startup").await;
        report.aborted = aborted;
        report.failed = failed;

        info!(
            "Startup sweep: {} open, {} aborted, {} failed",
            report.examined, report.aborted, report.failed
        );
        Ok(report)
    }

    /// Reclaim registry sessions older than the TTL.
    pub async fn sweep_expired(&self) -> SweepReport {
        self.sweep_expired_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> SweepReport {
        let candidates = self.registry.expired_handles(now, self.ttl);
        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        let mut claimed = Vec::with_capacity(candidates.len());
        for handle in candidates {
            match self
                .registry
                .take_if(&handle, |s| s.is_expired(now, self.ttl))
            {
                Some(session) => {
                    debug!(
                        "Reclaiming expired upload {} ({})",
                        session.handle, session.object_key
                    );
                    claimed.push(RemoteSession {
                        key: session.object_key,
                        remote_session_id: session.remote_session_id,
                        initiated_at: session.created_at,
                    });
                }
                None => report.skipped += 1,
            }
        }

        let (aborted, failed) = self.abort_all(claimed, "periodic").await;
        report.aborted = aborted;
        report.failed = failed;

        if report.examined > 0 {
            info!(
                "Expiry sweep: {} expired, {} aborted, {} failed",
                report.examined, report.aborted, report.failed
            );
        }
        report
    }

    /// Abort sessions with bounded concurrency, returning (aborted, failed).
    async fn abort_all(&self, sessions: Vec<RemoteSession>, trigger: &str) -> (usize, usize) {
        let results: Vec<bool> = futures::stream::iter(sessions)
            .map(|remote| async move {
                match self
                    .gateway
                    .abort_session(&remote.key, &remote.remote_session_id)
                    .await
                {
                    Ok(()) | Err(GatewayError::NoSuchUpload(_)) => true,
                    Err(e) => {
                        self.metrics.backend_error("abort");
                        warn!(
                            "Failed to abort expired upload {} ({}): {}",
                            remote.remote_session_id, remote.key, e
                        );
                        false
                    }
                }
            })
            .buffer_unordered(Self::MAX_CONCURRENT_ABORTS)
            .collect()
            .await;

        let aborted = results.iter().filter(|ok| **ok).count();
        self.metrics
            .sessions_reclaimed_total
            .with_label_values(&[trigger])
            .inc_by(aborted as u64);
        (aborted, results.len() - aborted)
    }

    /// Run the startup sweep once in the background.
    pub fn spawn_startup_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            // Listing failure was already logged; the periodic sweep and the
            // next restart remain as backstops.
            let _ = this.startup_sweep().await;
        })
    }

    /// Run the expiry sweep every `sweep_interval` until `shutdown` fires.
    pub fn spawn_periodic(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + this.interval;
            let mut ticker = tokio::time::interval_at(start, this.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Expiry sweep stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        this.sweep_expired().await;
                    }
                }
            }
        })
    }
}
