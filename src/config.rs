//! Configuration for the upload orchestrator service

use crate::gateway::MAX_PRESIGN_VALIDITY;
use crate::planner::{
    MAX_PLANNABLE_SIZE, MIB, S3_MAX_PARTS, S3_MAX_PART_SIZE, S3_MIN_PART_SIZE,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "upload_orchestrator.toml",
    "/etc/upload_orchestrator/config.toml",
];

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Log level filter string. Overridden by RUST_LOG.
    /// Default: "upload_orchestrator=debug,tower_http=debug"
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Object store backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Multipart upload lifecycle settings
    #[serde(default)]
    pub uploads: UploadSettings,
}

/// Object store backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// S3 or any S3-compatible service
    S3 {
        /// Bucket every upload lands in
        bucket: String,

        /// S3 endpoint URL (for MinIO, LocalStack, or custom S3-compatible services)
        /// If not specified, uses AWS default endpoint
        #[serde(default)]
        endpoint: Option<String>,

        /// AWS region
        #[serde(default = "default_region")]
        region: String,

        /// Use path-style URLs (required for MinIO, LocalStack)
        #[serde(default = "default_force_path_style")]
        force_path_style: bool,

        #[serde(default)]
        access_key_id: Option<String>,

        #[serde(default)]
        secret_access_key: Option<String>,

        /// Base URL for retrieving finalized objects (CDN, public bucket domain).
        /// Defaults to the endpoint (path style) or the AWS bucket domain.
        #[serde(default)]
        public_base_url: Option<String>,

        /// Upper bound on any single backend call, retries included
        #[serde(with = "duration_str", default = "default_operation_timeout")]
        operation_timeout: Duration,
    },

    /// In-process backend for local development. Nothing is stored.
    Memory {
        #[serde(default = "default_memory_base_url")]
        base_url: String,
    },
}

/// Multipart upload lifecycle and part sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Age after which a pending session is reclaimed
    #[serde(with = "duration_str", default = "default_session_ttl")]
    pub session_ttl: Duration,

    /// Period of the in-process expiry sweep
    #[serde(with = "duration_str", default = "default_sweep_interval")]
    pub sweep_interval: Duration,

    /// Validity window of each presigned part URL
    #[serde(with = "duration_str", default = "default_presign_expiry")]
    pub presign_expiry: Duration,

    #[serde(default = "default_min_part_size")]
    pub min_part_size: u64,

    #[serde(default = "default_medium_part_size")]
    pub medium_part_size: u64,

    #[serde(default = "default_large_part_size")]
    pub large_part_size: u64,

    /// Objects at or above this size use `large_part_size`
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold: u64,

    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,

    /// Abort stale remote sessions once at startup
    #[serde(default = "default_true")]
    pub startup_sweep: bool,

    /// Run the periodic in-process expiry sweep. Multi-instance deployments
    /// disable this and rely on the backend-anchored startup sweep.
    #[serde(default = "default_true")]
    pub periodic_sweep: bool,
}

// Default value functions for serde
fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_force_path_style() -> bool {
    true
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_memory_base_url() -> String {
    "http://localhost:8080/objects".to_string()
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_presign_expiry() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_min_part_size() -> u64 {
    S3_MIN_PART_SIZE
}

fn default_medium_part_size() -> u64 {
    50 * MIB
}

fn default_large_part_size() -> u64 {
    100 * MIB
}

fn default_large_file_threshold() -> u64 {
    500 * MIB
}

fn default_max_object_size() -> u64 {
    5 * 1024 * 1024 * MIB // 5 TiB, the S3 object limit
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "upload_orchestrator=debug,tower_http=debug".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory {
            base_url: default_memory_base_url(),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            session_ttl: default_session_ttl(),
            sweep_interval: default_sweep_interval(),
            presign_expiry: default_presign_expiry(),
            min_part_size: default_min_part_size(),
            medium_part_size: default_medium_part_size(),
            large_part_size: default_large_part_size(),
            large_file_threshold: default_large_file_threshold(),
            max_object_size: default_max_object_size(),
            startup_sweep: true,
            periodic_sweep: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            backend: BackendConfig::default(),
            uploads: UploadSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl UploadSettings {
    /// Reject settings the backend or the lifecycle cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_part_size < S3_MIN_PART_SIZE {
            return Err(ConfigError::Invalid(format!(
                "min_part_size {} is below the backend floor of {} bytes",
                self.min_part_size, S3_MIN_PART_SIZE
            )));
        }
        if self.medium_part_size < self.min_part_size
            || self.large_part_size < self.medium_part_size
        {
            return Err(ConfigError::Invalid(
                "part sizes must satisfy min <= medium <= large".to_string(),
            ));
        }
        if self.large_part_size > S3_MAX_PART_SIZE {
            return Err(ConfigError::Invalid(format!(
                "large_part_size {} exceeds the backend part limit of {} bytes",
                self.large_part_size, S3_MAX_PART_SIZE
            )));
        }
        if self.max_object_size > MAX_PLANNABLE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_object_size {} exceeds {} bytes ({} parts of at most {} bytes)",
                self.max_object_size, MAX_PLANNABLE_SIZE, S3_MAX_PARTS, S3_MAX_PART_SIZE
            )));
        }
        if self.large_file_threshold < self.large_part_size {
            return Err(ConfigError::Invalid(
                "large_file_threshold must be at least large_part_size".to_string(),
            ));
        }
        if self.session_ttl.is_zero() || self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "session_ttl and sweep_interval must be non-zero".to_string(),
            ));
        }
        if self.presign_expiry.is_zero() || self.presign_expiry > MAX_PRESIGN_VALIDITY {
            return Err(ConfigError::Invalid(format!(
                "presign_expiry must be between 1s and {}",
                humantime::format_duration(MAX_PRESIGN_VALIDITY)
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `UPO_*` environment variables onto this config.
    pub fn apply_env(&mut self) {
        if let Some(addr) = env_parse("UPO_LISTEN_ADDR") {
            self.listen_addr = addr;
        }

        if let Ok(bucket) = std::env::var("UPO_S3_BUCKET") {
            self.backend = BackendConfig::S3 {
                bucket,
                endpoint: std::env::var("UPO_S3_ENDPOINT").ok(),
                region: std::env::var("UPO_S3_REGION").unwrap_or_else(|_| default_region()),
                force_path_style: std::env::var("UPO_S3_PATH_STYLE")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(true),
                access_key_id: std::env::var("UPO_S3_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("UPO_S3_SECRET_ACCESS_KEY").ok(),
                public_base_url: std::env::var("UPO_PUBLIC_BASE_URL").ok(),
                operation_timeout: env_duration("UPO_S3_OPERATION_TIMEOUT")
                    .unwrap_or_else(default_operation_timeout),
            };
        }

        if let Some(ttl) = env_duration("UPO_SESSION_TTL") {
            self.uploads.session_ttl = ttl;
        }
        if let Some(interval) = env_duration("UPO_SWEEP_INTERVAL") {
            self.uploads.sweep_interval = interval;
        }
        if let Some(expiry) = env_duration("UPO_PRESIGN_EXPIRY") {
            self.uploads.presign_expiry = expiry;
        }
        if let Some(size) = env_parse("UPO_MAX_OBJECT_SIZE") {
            self.uploads.max_object_size = size;
        }
        if let Ok(level) = std::env::var("UPO_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Load configuration from `UPO_CONFIG`, else the first default path
    /// that exists, else the environment alone.
    ///
    /// A config file that is named or present but unreadable is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("UPO_CONFIG").ok();
        Self::load_from(explicit.as_deref(), DEFAULT_CONFIG_PATHS)
    }

    fn load_from(explicit: Option<&str>, candidates: &[&str]) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path),
            None => candidates
                .iter()
                .copied()
                .find(|p| std::path::Path::new(p).exists()),
        };

        match path {
            Some(path) => {
                let mut config = Self::from_file(path)?;
                config.apply_env();
                Ok(config)
            }
            None => Ok(Self::from_env()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_duration(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| humantime::parse_duration(&v).ok())
}

/// Human-readable durations ("30m", "15m", "1h 30m") in TOML.
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
