//! Configuration management for the enermap API.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `7000`.
//! - `DATA_DIR` - Optional. Base directory for task artifacts and the SQLite
//!   database. Defaults to `<tmp>/enermap`.
//! - `TASK_STORE` - Optional. `memory` or `sqlite`. Defaults to `memory`.
//! - `WORKERS` - Optional. Calculation worker pool width. Defaults to the
//!   number of CPUs.
//! - `TASK_RETENTION_HOURS` - Optional. When set, terminal tasks older than
//!   this many hours are purged in the background. Unset means tasks live
//!   until the client deletes them.
//! - `DATASETS_SERVER_URL` - Optional. Remote dataset server to merge
//!   catalog metadata from at startup.
//! - `DATASETS_SERVER_API_KEY` - Required when `DATASETS_SERVER_URL` is set.
//!   Bearer token for the dataset server.

use std::path::PathBuf;
use thiserror::Error;

use crate::task::store::TaskStoreKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Base directory for artifacts and durable state
    pub data_dir: PathBuf,

    /// Task store backend selection
    pub task_store: TaskStoreKind,

    /// Width of the calculation worker pool
    pub workers: usize,

    /// Optional retention window for terminal tasks, in hours
    pub task_retention_hours: Option<u64>,

    /// Remote dataset server base URL (catalog refresh at startup)
    pub datasets_server_url: Option<String>,

    /// Bearer token for the remote dataset server
    pub datasets_server_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "7000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("enermap"));

        let task_store = std::env::var("TASK_STORE")
            .map(|s| TaskStoreKind::from_str(&s))
            .unwrap_or_default();

        let workers = match std::env::var("WORKERS") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| ConfigError::InvalidValue("WORKERS".to_string(), format!("{}", e)))?,
            Err(_) => num_cpus::get(),
        };
        if workers == 0 {
            return Err(ConfigError::InvalidValue(
                "WORKERS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let task_retention_hours = match std::env::var("TASK_RETENTION_HOURS") {
            Ok(raw) => Some(raw.parse().map_err(|e| {
                ConfigError::InvalidValue("TASK_RETENTION_HOURS".to_string(), format!("{}", e))
            })?),
            Err(_) => None,
        };

        let datasets_server_url = std::env::var("DATASETS_SERVER_URL").ok();
        let datasets_server_api_key = std::env::var("DATASETS_SERVER_API_KEY").ok();
        if datasets_server_url.is_some() && datasets_server_api_key.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "DATASETS_SERVER_API_KEY".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            data_dir,
            task_store,
            workers,
            task_retention_hours,
            datasets_server_url,
            datasets_server_api_key,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7000,
            data_dir,
            task_store: TaskStoreKind::Memory,
            workers: 2,
            task_retention_hours: None,
            datasets_server_url: None,
            datasets_server_api_key: None,
        }
    }
}
