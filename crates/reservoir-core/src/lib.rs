//! # reservoir-core
//!
//! Foundation crate for the reservoir handle pool.
//! Slots and handle ids, errors and the per-thread error sink,
//! TOML configuration, tracing setup, the two-tier lock, and the
//! traits pools and migration steppers are written against.

pub mod config;
pub mod errors;
pub mod migration;
pub mod sync;
pub mod tracing_setup;
pub mod traits;
pub mod types;

pub use config::ReservoirConfig;
pub use errors::{ReservoirError, ThreadedErrors};
pub use migration::{MigrationInfo, Schema};
pub use types::{slots, HandleId, Slot};
