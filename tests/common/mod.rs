//! Shared test infrastructure for integration tests
//!
//! Provides an in-process TestServer over the memory gateway, a spawned
//! binary server, orchestrator builders, and MinIO availability gating.

#![allow(dead_code)]

use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use upload_orchestrator::api::{self, AppState};
use upload_orchestrator::config::UploadSettings;
use upload_orchestrator::gateway::MemoryGateway;
use upload_orchestrator::session::{CompletedPart, OwnerContext};
use upload_orchestrator::{InitUploadRequest, UploadOrchestrator};

/// Port counter for spawned binaries, to avoid conflicts between tests.
static PORT_COUNTER: AtomicU16 = AtomicU16::new(19400);

pub const MIB: u64 = 1024 * 1024;

/// MinIO configuration constants
pub const MINIO_ENDPOINT: &str = "http://localhost:9000";
pub const MINIO_BUCKET: &str = "upload-orchestrator-test";
pub const MINIO_ACCESS_KEY: &str = "minioadmin";
pub const MINIO_SECRET_KEY: &str = "minioadmin";

// ── Orchestrator builders ──

/// Orchestrator over a fresh memory gateway with default settings.
pub fn memory_orchestrator() -> (Arc<MemoryGateway>, Arc<UploadOrchestrator>) {
    memory_orchestrator_with(UploadSettings::default())
}

pub fn memory_orchestrator_with(
    settings: UploadSettings,
) -> (Arc<MemoryGateway>, Arc<UploadOrchestrator>) {
    let gateway = Arc::new(MemoryGateway::new("http://objects.test"));
    let orchestrator = Arc::new(UploadOrchestrator::new(gateway.clone(), settings));
    (gateway, orchestrator)
}

pub fn init_request(key: &str, size: u64) -> InitUploadRequest {
    InitUploadRequest {
        key: key.to_string(),
        size,
        content_type: "application/octet-stream".to_string(),
        owner: OwnerContext {
            folder: Some("folder-17".to_string()),
            principal: Some("user-3".to_string()),
        },
    }
}

/// One fake ETag per part, in ascending order.
pub fn parts(count: u32) -> Vec<CompletedPart> {
    (1..=count)
        .map(|n| CompletedPart::new(n, format!("\"etag-{}\"", n)))
        .collect()
}

// ── In-process HTTP server ──

/// Router served on an ephemeral port, sharing its orchestrator with the test.
pub struct TestServer {
    addr: std::net::SocketAddr,
    pub gateway: Arc<MemoryGateway>,
    pub orchestrator: Arc<UploadOrchestrator>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let (gateway, orchestrator) = memory_orchestrator();
        let state = Arc::new(AppState {
            orchestrator: orchestrator.clone(),
            backend: "memory",
        });
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().unwrap();
        let app = api::router(state);
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            gateway,
            orchestrator,
            task,
        }
    }

    /// Get the HTTP endpoint URL
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ── Spawned binary ──

/// Test server wrapper that spawns a real upload_orchestrator binary
pub struct BinaryServer {
    process: Child,
    port: u16,
    _config_dir: TempDir,
}

impl BinaryServer {
    /// Start the binary with the memory backend (no Docker needed)
    pub async fn memory() -> Self {
        Self::spawn_with_config("[backend]\ntype = \"memory\"\n").await
    }

    async fn spawn_with_config(config_body: &str) -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let full_config = format!("listen_addr = \"127.0.0.1:{}\"\n{}", port, config_body);

        let config_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = config_dir.path().join("test.toml");
        std::fs::write(&config_path, &full_config).expect("Failed to write test config");

        let process = Command::new(env!("CARGO_BIN_EXE_upload_orchestrator"))
            .env("UPO_CONFIG", &config_path)
            .env("RUST_LOG", "upload_orchestrator=warn")
            .spawn()
            .expect("Failed to start server");

        let mut server = Self {
            process,
            port,
            _config_dir: config_dir,
        };
        server.wait_ready().await;
        server
    }

    async fn wait_ready(&mut self) {
        let addr = format!("127.0.0.1:{}", self.port);
        for _ in 0..150 {
            if std::net::TcpStream::connect(&addr).is_ok() {
                return;
            }

            if let Ok(Some(status)) = self.process.try_wait() {
                panic!("Server exited before becoming ready: {}", status);
            }

            sleep(Duration::from_millis(100)).await;
        }

        let _ = self.process.kill();
        panic!("Timed out waiting for server on {}", addr);
    }

    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for BinaryServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
    }
}

// ── MinIO ──

pub fn minio_client() -> Client {
    let credentials = Credentials::new(MINIO_ACCESS_KEY, MINIO_SECRET_KEY, None, None, "test");
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .endpoint_url(MINIO_ENDPOINT)
        .credentials_provider(credentials)
        .force_path_style(true)
        .build();
    Client::from_conf(config)
}

/// Check if MinIO is available (TCP probe + HeadBucket with 2s timeout)
pub async fn minio_available() -> bool {
    if std::net::TcpStream::connect("localhost:9000").is_err() {
        return false;
    }

    let client = minio_client();
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        client.head_bucket().bucket(MINIO_BUCKET).send(),
    )
    .await;
    matches!(result, Ok(Ok(_)))
}

/// Macro to skip a test if MinIO is not available.
/// Use at the start of any test that requires MinIO.
#[macro_export]
macro_rules! skip_unless_minio {
    () => {
        if !common::minio_available().await {
            eprintln!("MinIO not available, skipping test");
            return;
        }
    };
}
