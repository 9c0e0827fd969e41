//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Largest accepted request body in bytes (push payloads).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    256 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Durable storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain if not set.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the ambient credential chain if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
        /// Create the bucket at startup if it does not exist.
        #[serde(default)]
        create_bucket: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.is_empty() {
                    return Err("s3 config requires a bucket name".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            _ => Ok(()),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (testing and small deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password. Prefer BUNDLER_METADATA__PASSWORD over the config file.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(60_000)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Blob cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the in-process volatile tier in front of durable storage.
    #[serde(default = "default_volatile_enabled")]
    pub volatile_enabled: bool,
    /// Volatile tier capacity in entries.
    #[serde(default = "default_volatile_capacity")]
    pub volatile_capacity: usize,
    /// Attempts per durable operation, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Fixed delay between durable attempts in milliseconds.
    #[serde(default)]
    pub retry_backoff_ms: u64,
}

fn default_volatile_enabled() -> bool {
    true
}

fn default_volatile_capacity() -> usize {
    4096
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            volatile_enabled: default_volatile_enabled(),
            volatile_capacity: default_volatile_capacity(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: 0,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.retry_attempts == 0 {
            return Err("cache.retry_attempts must be at least 1".to_string());
        }
        if self.volatile_enabled && self.volatile_capacity == 0 {
            return Err(
                "cache.volatile_capacity must be positive when the volatile tier is enabled"
                    .to_string(),
            );
        }
        Ok(())
    }
}

/// Handshake verification configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
}

/// How handshake signatures are verified.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthMode {
    /// Ed25519 signature over the decoded token bytes.
    Ed25519 {
        /// Base64-encoded 32-byte verifying key.
        public_key: String,
    },
    /// Accept any signature. Testing only.
    #[default]
    Insecure,
}

/// Bundle footer builder configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PackagerConfig {
    #[serde(default)]
    pub mode: PackagerMode,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PackagerMode {
    /// Run the external packager through bash.
    Command {
        /// Packager executable.
        #[serde(default = "default_packager_program")]
        program: String,
        /// nvm installation to source before running the packager.
        nvm_dir: Option<PathBuf>,
    },
    /// Write placeholder footers. Testing only.
    #[default]
    Dummy,
}

fn default_packager_program() -> String {
    "siphon-packager.py".to_string()
}

/// App metadata registry configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub mode: RegistryMode,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistryMode {
    /// PUT app metadata to the web frontend.
    Http {
        /// Base URL, e.g. "https://getsiphon.com".
        base_url: String,
        /// Request timeout in seconds.
        #[serde(default = "default_registry_timeout_secs")]
        timeout_secs: u64,
    },
    /// Log the update and succeed. Testing only.
    #[default]
    Log,
}

fn default_registry_timeout_secs() -> u64 {
    30
}

/// App update notification configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook receiving `app_updated` events. Events are only logged when unset.
    pub webhook_url: Option<String>,
    /// Pending events kept before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Healthcheck configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HealthConfig {
    /// App whose development namespace must be non-empty for the check to pass.
    pub probe_app_id: Option<String>,
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub packager: PackagerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub healthcheck: HealthConfig,
}

impl AppConfig {
    /// Create a test configuration.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata,
    /// unsigned handshakes, dummy footers and a logging registry.
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.metadata.validate()?;
        self.cache.validate()?;
        Ok(())
    }

    /// Whether any section runs in a testing-only mode.
    pub fn insecure_modes(&self) -> Vec<&'static str> {
        let mut modes = Vec::new();
        if matches!(self.auth.mode, AuthMode::Insecure) {
            modes.push("auth.mode=insecure");
        }
        if matches!(self.packager.mode, PackagerMode::Dummy) {
            modes.push("packager.mode=dummy");
        }
        if matches!(self.registry.mode, RegistryMode::Log) {
            modes.push("registry.mode=log");
        }
        modes
    }
}
