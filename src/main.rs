//! Upload Orchestrator - presigned multipart uploads straight to object storage

use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upload_orchestrator::api::{self, AppState};
use upload_orchestrator::config::{BackendConfig, Config};
use upload_orchestrator::gateway::{MemoryGateway, ObjectStoreGateway, S3Gateway};
use upload_orchestrator::UploadOrchestrator;

/// Upload Orchestrator - presigned multipart uploads for S3-compatible storage
#[derive(Parser, Debug)]
#[command(name = "upload_orchestrator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Skip the startup sweep of stale backend uploads
    #[arg(long)]
    no_startup_sweep: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from file if specified, otherwise use default loading
    let mut config = if let Some(ref path) = cli.config {
        let mut config = Config::from_file(path)?;
        config.apply_env();
        config
    } else {
        Config::load()?
    };

    // Initialize tracing
    let log_level = if cli.verbose {
        "upload_orchestrator=trace,tower_http=trace".to_string()
    } else {
        config.log_level.clone()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // CLI overrides
    if let Some(ref addr) = cli.listen {
        config.listen_addr = addr.parse()?;
    }
    if cli.no_startup_sweep {
        config.uploads.startup_sweep = false;
    }
    config.uploads.validate()?;

    info!("Starting Upload Orchestrator");
    info!("  Listen address: {}", config.listen_addr);

    let (gateway, backend): (Arc<dyn ObjectStoreGateway>, &'static str) = match &config.backend
    {
        BackendConfig::S3 {
            bucket,
            endpoint,
            region,
            ..
        } => {
            info!("  Backend: S3");
            info!("  Bucket: {}", bucket);
            info!("  Region: {}", region);
            if let Some(ep) = endpoint {
                info!("  Endpoint: {}", ep);
            }
            (Arc::new(S3Gateway::new(&config.backend)?), "s3")
        }
        BackendConfig::Memory { base_url } => {
            warn!("  Backend: in-memory (development only, nothing is stored)");
            (Arc::new(MemoryGateway::new(base_url.clone())), "memory")
        }
    };

    let uploads = &config.uploads;
    info!(
        "  Session TTL: {}",
        humantime::format_duration(uploads.session_ttl)
    );
    info!(
        "  Presigned URL validity: {}",
        humantime::format_duration(uploads.presign_expiry)
    );
    if uploads.periodic_sweep {
        info!(
            "  Expiry sweep every {}",
            humantime::format_duration(uploads.sweep_interval)
        );
    } else {
        warn!("  Periodic expiry sweep is DISABLED; only the startup sweep reclaims uploads");
    }

    let orchestrator = Arc::new(UploadOrchestrator::new(gateway, config.uploads.clone()));
    let reclaimer = Arc::new(orchestrator.reclaimer());

    let state = Arc::new(AppState {
        orchestrator: Arc::clone(&orchestrator),
        backend,
    });
    let app = api::router(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(
        "Upload Orchestrator listening on http://{}",
        config.listen_addr
    );

    // Process is ready: start the background sweeps
    if config.uploads.startup_sweep {
        reclaimer.spawn_startup_sweep();
    }
    let shutdown = CancellationToken::new();
    let periodic = config
        .uploads
        .periodic_sweep
        .then(|| reclaimer.spawn_periodic(shutdown.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Some(task) = periodic {
        let _ = task.await;
    }
    if orchestrator.pending_count() > 0 {
        warn!(
            "{} uploads still pending at shutdown; the next startup sweep will reclaim them",
            orchestrator.pending_count()
        );
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Handle shutdown signals (SIGINT, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
