//! Database facade: one pool of SQLite handles per database file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reservoir_core::config::{ReservoirConfig, SqliteConfig};
use reservoir_core::errors::{PoolError, ReservoirError, StorageError};
use reservoir_core::traits::HandleFactory;
use reservoir_core::{slots, MigrationInfo, Slot};
use rusqlite::Connection;

use crate::connection::SqliteHandle;
use crate::migration::{MigrationStepperHandle, MigrationWorker, Migrator};
use crate::pool::{HandlePool, RecyclableHandle};

/// The handle kinds a database pool hands out.
pub enum PooledHandle {
    Normal(SqliteHandle),
    Migration(MigrationStepperHandle),
}

impl PooledHandle {
    /// The migration side of this handle, if it has one.
    pub fn as_stepper(&self) -> Option<&MigrationStepperHandle> {
        match self {
            PooledHandle::Migration(stepper) => Some(stepper),
            PooledHandle::Normal(_) => None,
        }
    }

    pub fn sqlite(&self) -> &SqliteHandle {
        match self {
            PooledHandle::Normal(handle) => handle,
            PooledHandle::Migration(stepper) => stepper.base(),
        }
    }

    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        self.sqlite().with_connection(f)
    }
}

/// Produces opened, configured handles for ordinary slots and lazily opened
/// stepper handles for [`slots::MIGRATION`].
pub struct DatabaseFactory {
    path: PathBuf,
    sqlite: SqliteConfig,
    batch_size: usize,
}

impl DatabaseFactory {
    pub fn new(path: impl Into<PathBuf>, config: &ReservoirConfig) -> Self {
        Self {
            path: path.into(),
            sqlite: config.sqlite.clone(),
            batch_size: config.migration.batch_size,
        }
    }
}

impl HandleFactory for DatabaseFactory {
    type Handle = PooledHandle;

    fn generate_handle(&self, slot: Slot) -> Result<PooledHandle, StorageError> {
        if slot == slots::MIGRATION {
            return Ok(PooledHandle::Migration(MigrationStepperHandle::new(
                &self.path,
                self.sqlite.clone(),
                self.batch_size,
            )));
        }
        let handle = SqliteHandle::new(&self.path, self.sqlite.clone());
        handle.open()?;
        Ok(PooledHandle::Normal(handle))
    }

    fn will_configure_handle(&self, _slot: Slot, handle: &PooledHandle) -> Result<(), StorageError> {
        match handle {
            PooledHandle::Normal(handle) => handle.configure(),
            // Configured when first opened.
            PooledHandle::Migration(_) => Ok(()),
        }
    }
}

pub struct Database {
    path: PathBuf,
    config: ReservoirConfig,
    pool: Arc<HandlePool<DatabaseFactory>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open the database at `path`, checking that one handle can be created.
    pub fn open(path: impl Into<PathBuf>, config: ReservoirConfig) -> Result<Self, ReservoirError> {
        config.validate()?;
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::SqliteError {
                message: format!("failed to create database directory: {e}"),
            })?;
        }

        let pool = Arc::new(HandlePool::new(
            DatabaseFactory::new(&path, &config),
            &config.pool,
        ));
        pool.check_out(slots::NORMAL)?.release();
        tracing::info!(path = %path.display(), "database opened");

        Ok(Self { path, config, pool })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &ReservoirConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<HandlePool<DatabaseFactory>> {
        &self.pool
    }

    /// Check out a handle for ordinary traffic.
    pub fn handle(&self) -> Result<RecyclableHandle<PooledHandle>, PoolError> {
        self.pool.check_out(slots::NORMAL)
    }

    pub fn handle_for(&self, slot: Slot) -> Result<RecyclableHandle<PooledHandle>, PoolError> {
        self.pool.check_out(slot)
    }

    /// Run a batch of SQL on a pooled handle.
    pub fn execute_batch(&self, sql: &str) -> Result<(), ReservoirError> {
        let handle = self.handle()?;
        handle
            .with_connection(|conn| conn.execute_batch(sql).map_err(crate::connection::sqlite_error))?;
        Ok(())
    }

    pub fn blockade(&self) {
        self.pool.blockade();
    }

    pub fn unblockade(&self) {
        self.pool.unblockade();
    }

    pub fn is_blockaded(&self) -> bool {
        self.pool.is_blockaded()
    }

    pub fn purge(&self) {
        self.pool.purge();
    }

    /// Wait for every handle to come back, close them all, then run
    /// `on_closed`. The database stays blockaded until `unblockade`.
    pub fn close<C: FnOnce()>(&self, on_closed: C) {
        self.pool.drain(on_closed);
        tracing::info!(path = %self.path.display(), "database closed");
    }

    /// Interrupt every migration step that currently allows it.
    pub fn interrupt_migration(&self) {
        for handle in self.pool.alive_handles(slots::MIGRATION) {
            if let Some(stepper) = handle.as_stepper() {
                stepper.interrupt();
            }
        }
    }

    /// Start a background worker migrating `infos` in order.
    pub fn spawn_migration_worker(
        &self,
        infos: impl IntoIterator<Item = MigrationInfo>,
    ) -> Result<MigrationWorker, StorageError> {
        MigrationWorker::spawn(
            Arc::clone(&self.pool),
            Migrator::with_infos(infos),
            self.config.migration.step_interval(),
        )
    }

    pub fn thread_error(&self) -> Option<ReservoirError> {
        self.pool.thread_error()
    }
}
