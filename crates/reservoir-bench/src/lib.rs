//! Shared fixtures for the reservoir benchmarks.

use std::path::Path;

use reservoir_core::errors::StorageError;
use reservoir_core::traits::HandleFactory;
use reservoir_core::Slot;
use rusqlite::{params, Connection};

/// Factory whose handles cost nothing to create, so benchmarks measure only
/// pool bookkeeping.
#[derive(Debug, Default)]
pub struct NoopFactory;

impl HandleFactory for NoopFactory {
    type Handle = ();

    fn generate_handle(&self, _slot: Slot) -> Result<(), StorageError> {
        Ok(())
    }

    fn will_configure_handle(&self, _slot: Slot, _handle: &()) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Create `origin` and an empty `target` with the same shape in the database
/// at `path`, filling `origin` with `rows` rows.
pub fn seed_migration_tables(
    path: &Path,
    origin: &str,
    target: &str,
    rows: usize,
) -> rusqlite::Result<()> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(&format!(
        "CREATE TABLE {origin} (id INTEGER PRIMARY KEY, payload BLOB NOT NULL);
         CREATE TABLE {target} (id INTEGER PRIMARY KEY, payload BLOB NOT NULL);"
    ))?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&format!("INSERT INTO {origin}(payload) VALUES (?1)"))?;
        for i in 0..rows {
            stmt.execute(params![vec![(i % 251) as u8; 128]])?;
        }
    }
    tx.commit()
}
