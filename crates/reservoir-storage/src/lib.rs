//! # reservoir-storage
//!
//! Slot-partitioned handle pool over SQLite connections.
//! Reused handles, blockade and drain, and an incremental
//! migration stepper driven round by round by a coordinator.

pub mod connection;
pub mod database;
pub mod migration;
pub mod pool;

pub use connection::SqliteHandle;
pub use database::{Database, DatabaseFactory, PooledHandle};
pub use migration::{MigrationStepperHandle, MigrationWorker, Migrator, StepOutcome};
pub use pool::{HandlePool, RecyclableHandle};
