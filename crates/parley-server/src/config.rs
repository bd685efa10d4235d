//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use parley_shared::constants::{DEFAULT_HTTP_PORT, MAX_IMAGE_SIZE};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API and the event socket.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5001`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./parley.db`
    pub database_path: PathBuf,

    /// Filesystem path where uploaded images are stored.
    /// Env: `BLOB_STORAGE_PATH`
    /// Default: `./blobs`
    pub blob_storage_path: PathBuf,

    /// Maximum decoded image size in bytes.
    /// Env: `MAX_BLOB_SIZE`
    /// Default: 10 MiB
    pub max_blob_size: usize,

    /// Upper bound on a single storage call before the request fails
    /// with 504.
    /// Env: `STORAGE_TIMEOUT_SECS`
    /// Default: `10`
    pub storage_timeout: Duration,

    /// Outbound events buffered per socket before new ones are dropped.
    /// Env: `EVENT_QUEUE_CAPACITY`
    /// Default: `256`
    pub event_queue_capacity: usize,

    /// Allowed browser origin. `None` allows any origin.
    /// Env: `CORS_ORIGIN`
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./parley.db"),
            blob_storage_path: PathBuf::from("./blobs"),
            max_blob_size: MAX_IMAGE_SIZE,
            storage_timeout: Duration::from_secs(10),
            event_queue_capacity: 256,
            cors_origin: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("BLOB_STORAGE_PATH") {
            config.blob_storage_path = PathBuf::from(path);
        }

        if let Some(val) = lookup("MAX_BLOB_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_blob_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_BLOB_SIZE, using default"),
            }
        }

        if let Some(val) = lookup("STORAGE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.storage_timeout = Duration::from_secs(n),
                _ => tracing::warn!(value = %val, "Invalid STORAGE_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(val) = lookup("EVENT_QUEUE_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.event_queue_capacity = n,
                _ => tracing::warn!(value = %val, "Invalid EVENT_QUEUE_CAPACITY, using default"),
            }
        }

        if let Some(origin) = lookup("CORS_ORIGIN") {
            if !origin.trim().is_empty() {
                config.cors_origin = Some(origin.trim().to_string());
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
