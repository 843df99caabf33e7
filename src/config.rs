//! Broker configuration.
//!
//! `BrokerConfig` controls when the [`StorageBroker`](crate::StorageBroker)
//! opens a real on-disk store and how the default SQLite engine is tuned.
//!
//! `BrokerConfig` provides defaults via [`Default`], a fluent
//! [`BrokerConfig::builder()`] with validation, and can be read from a JSON
//! file where missing fields fall back to their defaults.
//!
//! # Examples
//!
//! ```rust
//! use solution_storage::config::BrokerConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = BrokerConfig::builder()
//!     .size_threshold(10 * 1024 * 1024)
//!     .test_mode(true)
//!     .build()?;
//! assert!(cfg.test_mode);
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `size_threshold`: solutions smaller than this (in bytes) only get real
//!   storage when a database file already exists (default: 50 MiB).
//! - `test_mode`: bypasses the primary-branch/path gate (default: `false`).
//! - `database_file_name`: file probed inside the working folder (default: `storage.ide`).
//! - `busy_timeout_ms`: SQLite busy timeout (default: 500).
//! - `max_connections`: SQLite pool size (default: 16).
//! - `event_capacity`: broker event channel capacity (default: 64).

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SIZE_THRESHOLD: u64 = 50 * 1024 * 1024;
pub const DEFAULT_DATABASE_FILE_NAME: &str = "storage.ide";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub size_threshold: u64,
    pub test_mode: bool,
    pub database_file_name: String,
    pub busy_timeout_ms: u64,
    pub max_connections: u32,
    pub event_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            test_mode: false,
            database_file_name: DEFAULT_DATABASE_FILE_NAME.to_string(),
            busy_timeout_ms: 500,
            max_connections: 16,
            event_capacity: 64,
        }
    }
}

impl BrokerConfig {
    pub fn builder() -> BrokerConfigBuilder {
        BrokerConfigBuilder::default()
    }

    /// Reads and validates a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading broker config {}", path.display()))?;
        let config: BrokerConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing broker config {}", path.display()))?;
        validate(&config)?;
        Ok(config)
    }

    /// Whether `size` (in bytes) stays below the real-storage threshold.
    pub fn is_below_threshold(&self, size: u64) -> bool {
        size < self.size_threshold
    }
}

/// Builder for [`BrokerConfig`].
#[derive(Debug, Clone, Default)]
pub struct BrokerConfigBuilder {
    inner: BrokerConfig,
}

impl BrokerConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut BrokerConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn size_threshold(self, bytes: u64) -> Self { self.map(|c| c.size_threshold = bytes) }
    pub fn test_mode(self, on: bool) -> Self { self.map(|c| c.test_mode = on) }
    pub fn database_file_name<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.database_file_name = name.into()) }
    pub fn busy_timeout_ms(self, ms: u64) -> Self { self.map(|c| c.busy_timeout_ms = ms) }
    pub fn max_connections(self, n: u32) -> Self { self.map(|c| c.max_connections = n) }
    pub fn event_capacity(self, n: usize) -> Self { self.map(|c| c.event_capacity = n) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut BrokerConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<BrokerConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("database_file_name {0:?} must be a plain, non-empty file name")]
    InvalidDatabaseFileName(String),
    #[error("max_connections must be at least 1")]
    ZeroConnections,
    #[error("event_capacity must be at least 1")]
    ZeroEventCapacity,
}

fn validate(c: &BrokerConfig) -> Result<(), ConfigError> {
    let name = Path::new(&c.database_file_name);
    let plain = name.file_name().map(|f| f == name.as_os_str()).unwrap_or(false);
    if c.database_file_name.is_empty() || !plain {
        return Err(ConfigError::InvalidDatabaseFileName(c.database_file_name.clone()));
    }
    if c.max_connections == 0 {
        return Err(ConfigError::ZeroConnections);
    }
    if c.event_capacity == 0 {
        return Err(ConfigError::ZeroEventCapacity);
    }
    Ok(())
}
