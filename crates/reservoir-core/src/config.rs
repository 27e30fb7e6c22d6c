//! TOML configuration for pools, migration, and SQLite handles.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Top-level configuration. Every section is optional in the TOML source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservoirConfig {
    pub pool: PoolConfig,
    pub migration: MigrationConfig,
    pub sqlite: SqliteConfig,
}

/// Handle pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum live handles per slot.
    pub max_handle_count: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_handle_count: 32,
        }
    }
}

/// Migration pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Rows moved per `migrate_rows` call.
    pub batch_size: usize,
    /// Delay between two steps of the background worker.
    pub step_interval_ms: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            step_interval_ms: 100,
        }
    }
}

impl MigrationConfig {
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }
}

/// PRAGMAs applied to every SQLite handle when it is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub journal_mode: String,
    pub synchronous: String,
    pub busy_timeout_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

impl ReservoirConfig {
    /// Parse and validate a TOML string.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&source)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_handle_count == 0 {
            return Err(ConfigError::Invalid {
                field: "pool.max_handle_count",
                message: "must be at least 1".to_string(),
            });
        }
        if self.migration.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "migration.batch_size",
                message: "must be at least 1".to_string(),
            });
        }
        const JOURNAL_MODES: [&str; 6] = ["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];
        if !JOURNAL_MODES
            .iter()
            .any(|mode| mode.eq_ignore_ascii_case(&self.sqlite.journal_mode))
        {
            return Err(ConfigError::Invalid {
                field: "sqlite.journal_mode",
                message: format!("unknown journal mode `{}`", self.sqlite.journal_mode),
            });
        }
        const SYNCHRONOUS: [&str; 4] = ["OFF", "NORMAL", "FULL", "EXTRA"];
        if !SYNCHRONOUS
            .iter()
            .any(|mode| mode.eq_ignore_ascii_case(&self.sqlite.synchronous))
        {
            return Err(ConfigError::Invalid {
                field: "sqlite.synchronous",
                message: format!("unknown synchronous level `{}`", self.sqlite.synchronous),
            });
        }
        Ok(())
    }
}
