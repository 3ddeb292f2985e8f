//! In-process gateway for tests and local development
//!
//! Keeps open multipart sessions in a map and records every call made against
//! it, so callers can assert exactly which remote operations happened. Failures
//! and latency can be injected per operation.

use super::traits::{GatewayError, ObjectStoreGateway, RemoteSession};
use crate::session::CompletedPart;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Gateway operation kinds, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Create,
    Presign,
    Complete,
    Abort,
    List,
}

/// A call observed by the memory gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Create {
        key: String,
        content_type: String,
    },
    Presign {
        remote_session_id: String,
        part_number: u32,
    },
    Complete {
        key: String,
        remote_session_id: String,
        parts: Vec<CompletedPart>,
    },
    Abort {
        key: String,
        remote_session_id: String,
    },
    List,
}

struct OpenSession {
    key: String,
    initiated_at: DateTime<Utc>,
}

/// Thread-safe in-memory multipart backend
pub struct MemoryGateway {
    base_url: String,
    sessions: Mutex<HashMap<String, OpenSession>>,
    calls: Mutex<Vec<GatewayCall>>,
    failing: Mutex<HashSet<GatewayOp>>,
    failing_aborts: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
    id_counter: AtomicU64,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new("http://memory.invalid")
    }
}

impl MemoryGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sessions: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            failing_aborts: Mutex::new(HashSet::new()),
            latency: Mutex::new(None),
            id_counter: AtomicU64::new(0),
        }
    }

    /// Make every subsequent call of `op` fail until cleared.
    pub fn fail(&self, op: GatewayOp) {
        self.failing.lock().insert(op);
    }

    /// Make aborting one specific remote session fail.
    pub fn fail_abort_of(&self, remote_session_id: &str) {
        self.failing_aborts
            .lock()
            .insert(remote_session_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
        self.failing_aborts.lock().clear();
    }

    /// Delay every call by `latency`, widening race windows in tests.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Open a session directly, as if a previous process had created it.
    pub fn seed_session(&self, key: &str, initiated_at: DateTime<Utc>) -> String {
        let id = self.next_id();
        self.sessions.lock().insert(
            id.clone(),
            OpenSession {
                key: key.to_string(),
                initiated_at,
            },
        );
        id
    }

    pub fn is_open(&self, remote_session_id: &str) -> bool {
        self.sessions.lock().contains_key(remote_session_id)
    }

    pub fn open_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    /// Remote session ids that were aborted, in call order.
    pub fn aborted(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                GatewayCall::Abort {
                    remote_session_id, ..
                } => Some(remote_session_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Part lists passed to every complete call, in call order.
    pub fn completed(&self) -> Vec<Vec<CompletedPart>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                GatewayCall::Complete { parts, .. } => Some(parts.clone()),
                _ => None,
            })
            .collect()
    }

    fn next_id(&self) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("mem-upload-{:06}", n)
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().push(call);
    }

    async fn enter(&self, op: GatewayOp) -> Result<(), GatewayError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.lock().contains(&op) {
            return Err(GatewayError::Other(format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStoreGateway for MemoryGateway {
    async fn create_session(&self, key: &str, content_type: &str) -> Result<String, GatewayError> {
        self.record(GatewayCall::Create {
            key: key.to_string(),
            content_type: content_type.to_string(),
        });
        self.enter(GatewayOp::Create).await?;
        Ok(self.seed_session(key, Utc::now()))
    }

    async fn presign_part_upload(
        &self,
        key: &str,
        remote_session_id: &str,
        part_number: u32,
        validity: Duration,
    ) -> Result<String, GatewayError> {
        self.record(GatewayCall::Presign {
            remote_session_id: remote_session_id.to_string(),
            part_number,
        });
        self.enter(GatewayOp::Presign).await?;
        if !self.is_open(remote_session_id) {
            return Err(GatewayError::NoSuchUpload(remote_session_id.to_string()));
        }
        Ok(format!(
            "{}/{}?uploadId={}&partNumber={}&expires={}",
            self.base_url,
            key,
            remote_session_id,
            part_number,
            validity.as_secs()
        ))
    }

    async fn complete_session(
        &self,
        key: &str,
        remote_session_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::Complete {
            key: key.to_string(),
            remote_session_id: remote_session_id.to_string(),
            parts: parts.to_vec(),
        });
        self.enter(GatewayOp::Complete).await?;

        // Mirror S3: parts must be ascending
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(GatewayError::S3("InvalidPartOrder".to_string()));
        }
        self.sessions
            .lock()
            .remove(remote_session_id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NoSuchUpload(remote_session_id.to_string()))
    }

    async fn abort_session(&self, key: &str, remote_session_id: &str) -> Result<(), GatewayError> {
        self.record(GatewayCall::Abort {
            key: key.to_string(),
            remote_session_id: remote_session_id.to_string(),
        });
        self.enter(GatewayOp::Abort).await?;
        if self.failing_aborts.lock().contains(remote_session_id) {
            return Err(GatewayError::Other(format!(
                "injected abort failure for {}",
                remote_session_id
            )));
        }
        self.sessions
            .lock()
            .remove(remote_session_id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NoSuchUpload(remote_session_id.to_string()))
    }

    async fn list_open_sessions(&self) -> Result<Vec<RemoteSession>, GatewayError> {
        self.record(GatewayCall::List);
        self.enter(GatewayOp::List).await?;
        let mut sessions: Vec<RemoteSession> = self
            .sessions
            .lock()
            .iter()
            .map(|(id, s)| RemoteSession {
                key: s.key.clone(),
                remote_session_id: id.clone(),
                initiated_at: s.initiated_at,
            })
            .collect();
        sessions.sort_by(|a, b| a.remote_session_id.cmp(&b.remote_session_id));
        Ok(sessions)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}
