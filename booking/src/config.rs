//! Configuration management for the booking component.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::StorageError;
use crate::storage::{InMemoryRecordStore, JsonFileRecordStore, RecordStore};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Record storage
    pub storage: StorageConfig,
    /// Notification delivery
    pub notifications: NotificationConfig,
    /// Log filter used when `RUST_LOG` is unset at startup
    pub log_level: String,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for JSON files; in-memory storage when unset
    pub data_dir: Option<PathBuf>,
    /// Byte limit per store (or per file for the JSON store); unlimited when unset
    pub capacity_bytes: Option<usize>,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Undelivered notifications buffered per subscriber
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            notifications: NotificationConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unparseable numbers fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: env::var("KINSHIP_DATA_DIR")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from),
                capacity_bytes: env::var("KINSHIP_STORAGE_CAPACITY_BYTES")
                    .ok()
                    .and_then(|s| s.parse().ok()),
            },
            notifications: NotificationConfig {
                channel_capacity: env::var("KINSHIP_NOTIFICATION_CAPACITY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(64),
            },
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl StorageConfig {
    /// Opens the configured record store
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the data directory can't be created.
    pub fn open_store(&self) -> Result<Arc<dyn RecordStore>, StorageError> {
        match (&self.data_dir, self.capacity_bytes) {
            (Some(dir), Some(capacity)) => {
                Ok(Arc::new(JsonFileRecordStore::open(dir)?.with_capacity(capacity)))
            },
            (Some(dir), None) => Ok(Arc::new(JsonFileRecordStore::open(dir)?)),
            (None, Some(capacity)) => Ok(Arc::new(InMemoryRecordStore::with_capacity(capacity))),
            (None, None) => Ok(Arc::new(InMemoryRecordStore::new())),
        }
    }
}
