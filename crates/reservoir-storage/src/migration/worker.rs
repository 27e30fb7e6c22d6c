//! Dedicated migration thread fed by a crossbeam-channel bounded(64).
//! Steps the migrator once per interval while there is work.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use reservoir_core::errors::StorageError;
use reservoir_core::traits::HandleFactory;
use reservoir_core::MigrationInfo;

use super::coordinator::{Migrator, StepOutcome};
use crate::database::PooledHandle;
use crate::pool::HandlePool;

const CHANNEL_BOUND: usize = 64;

/// A command sent to the migration thread.
#[derive(Debug)]
pub enum MigrationCommand {
    /// Append a unit to the queue.
    Enqueue(MigrationInfo),
    /// Run one step immediately, regardless of pause.
    StepNow,
    /// Stop stepping on the interval.
    Pause,
    Resume,
    /// Stop the thread.
    Shutdown,
}

/// Statistics from the migration worker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationStats {
    pub steps: usize,
    pub batches: usize,
    pub tables_completed: usize,
    pub failures: usize,
    /// Units still queued when the worker stopped.
    pub pending: usize,
}

/// Runs a [`Migrator`] on its own thread, one step per interval.
pub struct MigrationWorker {
    tx: Sender<MigrationCommand>,
    handle: Option<JoinHandle<MigrationStats>>,
}

impl MigrationWorker {
    /// Spawn the worker. It starts stepping right away unless `migrator` is empty.
    pub fn spawn<F>(
        pool: Arc<HandlePool<F>>,
        migrator: Migrator,
        interval: Duration,
    ) -> Result<Self, StorageError>
    where
        F: HandleFactory<Handle = PooledHandle> + 'static,
    {
        let (tx, rx) = bounded(CHANNEL_BOUND);

        let handle = thread::Builder::new()
            .name("reservoir-migration".to_string())
            .spawn(move || worker_loop(pool, migrator, rx, interval))
            .map_err(|e| StorageError::SqliteError {
                message: format!("failed to spawn migration thread: {e}"),
            })?;

        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Send a command to the worker.
    pub fn send(&self, cmd: MigrationCommand) -> Result<(), StorageError> {
        self.tx.send(cmd).map_err(|_| StorageError::SqliteError {
            message: "migration worker channel disconnected".to_string(),
        })
    }

    pub fn enqueue(&self, info: MigrationInfo) -> Result<(), StorageError> {
        self.send(MigrationCommand::Enqueue(info))
    }

    pub fn pause(&self) -> Result<(), StorageError> {
        self.send(MigrationCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), StorageError> {
        self.send(MigrationCommand::Resume)
    }

    pub fn step_now(&self) -> Result<(), StorageError> {
        self.send(MigrationCommand::StepNow)
    }

    /// Whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Shut down the worker thread and wait for completion.
    pub fn shutdown(mut self) -> Result<MigrationStats, StorageError> {
        let _ = self.tx.send(MigrationCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| StorageError::SqliteError {
                message: "migration worker thread panicked".to_string(),
            })
        } else {
            Ok(MigrationStats::default())
        }
    }
}

impl Drop for MigrationWorker {
    fn drop(&mut self) {
        // Signal shutdown if not already done
        let _ = self.tx.send(MigrationCommand::Shutdown);
    }
}

fn worker_loop<F>(
    pool: Arc<HandlePool<F>>,
    mut migrator: Migrator,
    rx: Receiver<MigrationCommand>,
    interval: Duration,
) -> MigrationStats
where
    F: HandleFactory<Handle = PooledHandle>,
{
    let mut stats = MigrationStats::default();
    let mut paused = false;

    loop {
        match rx.recv_timeout(interval) {
            Ok(MigrationCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(MigrationCommand::Enqueue(info)) => migrator.enqueue(info),
            Ok(MigrationCommand::StepNow) => step_once(&pool, &mut migrator, &mut stats),
            Ok(MigrationCommand::Pause) => paused = true,
            Ok(MigrationCommand::Resume) => paused = false,
            Err(RecvTimeoutError::Timeout) => {
                if !paused && !migrator.is_done() {
                    step_once(&pool, &mut migrator, &mut stats);
                }
            }
        }
    }

    stats.pending = migrator.pending();
    tracing::debug!(?stats, "migration worker stopped");
    stats
}

fn step_once<F>(pool: &HandlePool<F>, migrator: &mut Migrator, stats: &mut MigrationStats)
where
    F: HandleFactory<Handle = PooledHandle>,
{
    match migrator.step(pool) {
        Ok(StepOutcome::Idle) => {}
        Ok(StepOutcome::Migrated { .. }) => {
            stats.steps += 1;
            stats.batches += 1;
        }
        Ok(StepOutcome::Dropped { .. }) => {
            stats.steps += 1;
            stats.tables_completed += 1;
        }
        Err(_) => {
            // Already logged and recorded by the migrator.
            stats.failures += 1;
        }
    }
}
