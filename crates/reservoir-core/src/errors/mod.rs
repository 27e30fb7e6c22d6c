//! Error types shared across reservoir crates.
//!
//! Every error is `Clone` so the same value can be returned to the caller
//! and kept in the per-thread sink ([`ThreadedErrors`]).

pub mod threaded;

pub use threaded::ThreadedErrors;

use std::fmt;

use crate::types::Slot;

/// Failures of pool check-out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The pool is blockaded; back off and retry after `unblockade`.
    #[error("handle pool is blockaded")]
    Blockaded,

    /// The slot already holds its maximum number of live handles.
    #[error("slot {slot} reached its limit of {limit} handles")]
    LimitExceeded { slot: Slot, limit: usize },

    /// The factory could not produce a handle.
    #[error("failed to create handle for slot {slot}: {message}")]
    CreationFailed { slot: Slot, message: String },

    /// The configuration hook rejected a freshly created handle.
    #[error("failed to configure handle for slot {slot}: {message}")]
    ConfigurationFailed { slot: Slot, message: String },
}

/// Failures of the storage backend behind a handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("handle for {path} is not opened")]
    NotOpened { path: String },

    #[error("statement interrupted")]
    Interrupted,
}

impl StorageError {
    pub fn sqlite(message: impl Into<String>) -> Self {
        StorageError::SqliteError {
            message: message.into(),
        }
    }
}

/// The migration step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    Open,
    Switch,
    MigrateRows,
    DropOrigin,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationStep::Open => "open",
            MigrationStep::Switch => "switch",
            MigrationStep::MigrateRows => "migrate rows",
            MigrationStep::DropOrigin => "drop origin",
        };
        f.write_str(name)
    }
}

/// A migration step failed. Always step-local; nothing is retried here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    #[error("migration step `{step}` failed for table {table}: {source}")]
    StepFailed {
        step: MigrationStep,
        table: String,
        source: StorageError,
    },

    #[error("handle checked out for slot {slot} is not a migration stepper")]
    NotAStepper { slot: Slot },
}

impl MigrationError {
    pub fn step(step: MigrationStep, table: impl Into<String>, source: StorageError) -> Self {
        MigrationError::StepFailed {
            step,
            table: table.into(),
            source,
        }
    }

    /// Whether the failure came from an interrupted statement.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            MigrationError::StepFailed {
                source: StorageError::Interrupted,
                ..
            }
        )
    }
}

/// Configuration loading and validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {message}")]
    Parse { message: String },

    #[error("failed to read config {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid config value for `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Umbrella error for callers that do not care which layer failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReservoirError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
