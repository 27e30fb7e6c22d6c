//! The per-handle side of incremental migration.

use crate::errors::MigrationError;
use crate::migration::MigrationInfo;

/// One bounded unit of migration work per call.
///
/// A coordinator drives a stepper through
/// `migrate_rows` until it reports done, then `drop_origin_table`.
/// Implementations never retry internally.
pub trait Stepper {
    /// Move one batch of rows from `info`'s origin table into its target.
    /// Returns `true` once the origin table is empty.
    fn migrate_rows(&self, info: &MigrationInfo) -> Result<bool, MigrationError>;

    /// Drop `info`'s origin table.
    ///
    /// Precondition: `migrate_rows` has returned `true` for `info`.
    fn drop_origin_table(&self, info: &MigrationInfo) -> Result<(), MigrationError>;
}
