//! Drives migration steppers table by table, one step per call.

use std::collections::VecDeque;

use reservoir_core::errors::{MigrationError, ReservoirError};
use reservoir_core::traits::{HandleFactory, Stepper};
use reservoir_core::{slots, MigrationInfo};

use crate::database::PooledHandle;
use crate::pool::HandlePool;

/// What one [`Migrator::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing left to migrate.
    Idle,
    /// One batch moved; `done` once the origin table is empty.
    Migrated { table: String, done: bool },
    /// The exhausted origin table was dropped and the unit retired.
    Dropped { table: String },
}

#[derive(Debug)]
struct MigrationTask {
    info: MigrationInfo,
    exhausted: bool,
}

/// Ordered queue of migration units.
///
/// Each `step` checks out a migration handle, performs one transition of
/// the head unit and releases the handle again, so no handle is held
/// between rounds. A failed step leaves the unit queued; the next step
/// retries it unless the caller skips it.
#[derive(Debug, Default)]
pub struct Migrator {
    queue: VecDeque<MigrationTask>,
}

impl Migrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_infos(infos: impl IntoIterator<Item = MigrationInfo>) -> Self {
        let mut migrator = Self::new();
        for info in infos {
            migrator.enqueue(info);
        }
        migrator
    }

    pub fn enqueue(&mut self, info: MigrationInfo) {
        self.queue.push_back(MigrationTask {
            info,
            exhausted: false,
        });
    }

    /// Units not yet retired.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn current(&self) -> Option<&MigrationInfo> {
        self.queue.front().map(|task| &task.info)
    }

    /// Abandon the head unit.
    pub fn skip_current(&mut self) -> Option<MigrationInfo> {
        let task = self.queue.pop_front()?;
        tracing::warn!(info = %task.info, "skipping migration unit");
        Some(task.info)
    }

    /// Perform one migration step against `pool`.
    pub fn step<F>(&mut self, pool: &HandlePool<F>) -> Result<StepOutcome, ReservoirError>
    where
        F: HandleFactory<Handle = PooledHandle>,
    {
        let Some(task) = self.queue.front_mut() else {
            return Ok(StepOutcome::Idle);
        };

        let outcome = match run_step(task, pool) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(info = %task.info, error = %e, "migration step failed");
                pool.errors().record(e.clone());
                return Err(e);
            }
        };

        if let StepOutcome::Dropped { table } = &outcome {
            tracing::info!(table = %table, remaining = self.queue.len() - 1, "migration unit finished");
            self.queue.pop_front();
        }
        Ok(outcome)
    }

    /// Step until every unit is retired or a step fails.
    pub fn run_to_completion<F>(&mut self, pool: &HandlePool<F>) -> Result<usize, ReservoirError>
    where
        F: HandleFactory<Handle = PooledHandle>,
    {
        let mut steps = 0;
        while self.step(pool)? != StepOutcome::Idle {
            steps += 1;
        }
        Ok(steps)
    }
}

fn run_step<F>(task: &mut MigrationTask, pool: &HandlePool<F>) -> Result<StepOutcome, ReservoirError>
where
    F: HandleFactory<Handle = PooledHandle>,
{
    let handle = pool.check_out(slots::MIGRATION)?;
    let stepper = handle.as_stepper().ok_or(MigrationError::NotAStepper {
        slot: slots::MIGRATION,
    })?;
    let table = task.info.table().to_string();

    stepper.switch_migrating(&task.info)?;
    if task.exhausted {
        stepper.drop_origin_table(&task.info)?;
        return Ok(StepOutcome::Dropped { table });
    }

    stepper.set_interruptible(true);
    let migrated = stepper.migrate_rows(&task.info);
    stepper.set_interruptible(false);

    let done = migrated?;
    task.exhausted = done;
    Ok(StepOutcome::Migrated { table, done })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseFactory;
    use reservoir_core::config::ReservoirConfig;

    #[test]
    fn test_queue_order_and_skip() {
        let mut migrator = Migrator::with_infos([
            MigrationInfo::new("a", "a_old"),
            MigrationInfo::new("b", "b_old"),
        ]);
        assert_eq!(migrator.pending(), 2);
        assert_eq!(migrator.current().map(MigrationInfo::table), Some("a"));

        let skipped = migrator.skip_current().unwrap();
        assert_eq!(skipped.table(), "a");
        assert_eq!(migrator.current().map(MigrationInfo::table), Some("b"));

        migrator.skip_current();
        assert!(migrator.is_done());
        assert!(migrator.skip_current().is_none());
    }

    #[test]
    fn test_empty_migrator_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReservoirConfig::default();
        let pool = HandlePool::new(DatabaseFactory::new(dir.path().join("db"), &config), &config.pool);

        let mut migrator = Migrator::new();
        assert_eq!(migrator.step(&pool).unwrap(), StepOutcome::Idle);
        assert_eq!(migrator.run_to_completion(&pool).unwrap(), 0);
        // Nothing was checked out.
        assert_eq!(pool.alive_handle_count(), 0);
    }

    #[test]
    fn test_blockaded_pool_fails_step() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReservoirConfig::default();
        let pool = HandlePool::new(DatabaseFactory::new(dir.path().join("db"), &config), &config.pool);
        pool.blockade();

        let mut migrator = Migrator::with_infos([MigrationInfo::new("t", "t_old")]);
        let err = migrator.step(&pool).unwrap_err();
        assert_eq!(err, ReservoirError::Pool(reservoir_core::errors::PoolError::Blockaded));
        assert_eq!(migrator.pending(), 1);
    }

    #[test]
    fn test_origin_dropped_only_after_done() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let mut config = ReservoirConfig::default();
        config.migration.batch_size = 3;
        let pool = HandlePool::new(DatabaseFactory::new(&path, &config), &config.pool);

        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE t_old (v INTEGER); CREATE TABLE t (v INTEGER);
             INSERT INTO t_old VALUES (1), (2), (3), (4), (5), (6), (7), (8), (9), (10);",
        )
        .unwrap();
        let origin_rows = || -> i64 {
            conn.query_row("SELECT COUNT(*) FROM t_old", [], |r| r.get(0)).unwrap()
        };

        let mut migrator = Migrator::with_infos([MigrationInfo::new("t", "t_old")]);
        let mut previous = StepOutcome::Idle;
        loop {
            let rows_before = origin_rows();
            match migrator.step(&pool).unwrap() {
                StepOutcome::Dropped { table } => {
                    assert_eq!(table, "t");
                    assert_eq!(rows_before, 0);
                    assert_eq!(
                        previous,
                        StepOutcome::Migrated { table: "t".to_string(), done: true }
                    );
                    break;
                }
                StepOutcome::Migrated { table, done } => {
                    assert_eq!(done, origin_rows() == 0);
                    previous = StepOutcome::Migrated { table, done };
                }
                StepOutcome::Idle => panic!("queue emptied without dropping the origin"),
            }
        }
        assert!(migrator.is_done());
        assert_eq!(migrator.step(&pool).unwrap(), StepOutcome::Idle);
    }
}
