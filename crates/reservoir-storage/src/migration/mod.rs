//! Incremental, resumable migration on pooled handles.

pub mod coordinator;
pub mod queries;
pub mod stepper;
pub mod worker;

pub use coordinator::{Migrator, StepOutcome};
pub use stepper::{MigrationStepperHandle, StepperStats};
pub use worker::{MigrationCommand, MigrationStats, MigrationWorker};
