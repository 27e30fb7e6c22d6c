//! Pooled handle that performs one migration step per call.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use reservoir_core::config::SqliteConfig;
use reservoir_core::errors::{MigrationError, MigrationStep, StorageError};
use reservoir_core::traits::Stepper;
use reservoir_core::{MigrationInfo, Schema};

use super::queries;
use crate::connection::{with_immediate_transaction, SqliteHandle};

/// Counters kept by a stepper handle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StepperStats {
    pub attaches: usize,
    pub detaches: usize,
    pub batches: usize,
    pub rows_migrated: usize,
    pub tables_dropped: usize,
}

/// A SQLite handle that moves rows from an origin table into its target,
/// one bounded batch per call.
///
/// The origin database is attached lazily and re-attached only when the
/// schema of the requested [`MigrationInfo`] changes. Interrupts are honoured
/// only while the handle is marked interruptible.
pub struct MigrationStepperHandle {
    base: SqliteHandle,
    batch_size: usize,
    interruptible: AtomicBool,
    attached: Mutex<Schema>,
    stats: Mutex<StepperStats>,
}

impl MigrationStepperHandle {
    pub fn new(path: impl Into<PathBuf>, config: SqliteConfig, batch_size: usize) -> Self {
        Self {
            base: SqliteHandle::new(path, config),
            batch_size: batch_size.max(1),
            interruptible: AtomicBool::new(false),
            attached: Mutex::new(Schema::Main),
            stats: Mutex::new(StepperStats::default()),
        }
    }

    pub fn base(&self) -> &SqliteHandle {
        &self.base
    }

    pub fn set_interruptible(&self, interruptible: bool) {
        self.interruptible.store(interruptible, Ordering::Release);
    }

    pub fn is_interruptible(&self) -> bool {
        self.interruptible.load(Ordering::Acquire)
    }

    /// Cancel the running step, but only while interruptible.
    pub fn interrupt(&self) {
        if self.is_interruptible() {
            tracing::debug!(path = %self.base.path().display(), "interrupting migration step");
            self.base.interrupt();
        }
    }

    pub fn attached_schema(&self) -> Schema {
        self.attached.lock().clone()
    }

    pub fn stats(&self) -> StepperStats {
        self.stats.lock().clone()
    }

    /// Open and configure the base handle on first use. Idempotent.
    pub fn lazy_open(&self) -> Result<(), StorageError> {
        if self.base.is_opened() {
            return Ok(());
        }
        self.base.open()?;
        if let Err(e) = self.base.configure() {
            self.base.close();
            return Err(e);
        }
        Ok(())
    }

    fn open_for(&self, info: &MigrationInfo) -> Result<(), MigrationError> {
        self.lazy_open()
            .map_err(|e| MigrationError::step(MigrationStep::Open, info.table(), e))
    }

    /// Attach `info`'s origin schema if it is not the attached one.
    pub fn switch_migrating(&self, info: &MigrationInfo) -> Result<(), MigrationError> {
        let mut attached = self.attached.lock();
        if *attached == *info.schema() {
            return Ok(());
        }
        self.open_for(info)?;
        let fail = |e: StorageError| MigrationError::step(MigrationStep::Switch, info.table(), e);

        if !attached.is_main() {
            self.base
                .with_connection(|conn| queries::detach(conn, attached.name()))
                .map_err(fail)?;
            tracing::debug!(schema = %attached, "detached migration schema");
            *attached = Schema::Main;
            self.stats.lock().detaches += 1;
        }

        if let Schema::Attached { name, path } = info.schema() {
            self.base
                .with_connection(|conn| queries::attach(conn, path, name))
                .map_err(fail)?;
            tracing::debug!(schema = %name, path = %path.display(), "attached migration schema");
            self.stats.lock().attaches += 1;
        }
        *attached = info.schema().clone();
        Ok(())
    }

    /// Detach any origin schema and close the connection.
    pub fn close(&self) {
        let mut attached = self.attached.lock();
        if !attached.is_main() {
            let name = attached.name().to_string();
            if let Err(e) = self.base.with_connection(|conn| queries::detach(conn, &name)) {
                tracing::warn!(schema = %name, error = %e, "failed to detach on close");
            }
        }
        *attached = Schema::Main;
        self.base.close();
    }
}

impl Stepper for MigrationStepperHandle {
    fn migrate_rows(&self, info: &MigrationInfo) -> Result<bool, MigrationError> {
        self.switch_migrating(info)?;
        self.open_for(info)?;
        let (moved, done) = self
            .base
            .with_connection(|conn| {
                with_immediate_transaction(conn, |tx| {
                    queries::migrate_batch(tx, info, self.batch_size)
                })
            })
            .map_err(|e| MigrationError::step(MigrationStep::MigrateRows, info.table(), e))?;

        let mut stats = self.stats.lock();
        stats.batches += 1;
        stats.rows_migrated += moved;
        tracing::trace!(%info, moved, done, "migrated batch");
        Ok(done)
    }

    fn drop_origin_table(&self, info: &MigrationInfo) -> Result<(), MigrationError> {
        self.switch_migrating(info)?;
        self.open_for(info)?;
        debug_assert!(
            !matches!(
                self.base.with_connection(|conn| queries::origin_is_empty(conn, info)),
                Ok(false)
            ),
            "drop_origin_table called before migrate_rows reported done for {info}"
        );
        self.base
            .with_connection(|conn| queries::drop_origin_table(conn, info))
            .map_err(|e| MigrationError::step(MigrationStep::DropOrigin, info.table(), e))?;
        self.stats.lock().tables_dropped += 1;
        tracing::info!(%info, "dropped origin table");
        Ok(())
    }
}

impl Drop for MigrationStepperHandle {
    fn drop(&mut self) {
        self.close();
    }
}
