//! Write transaction utilities.

use reservoir_core::errors::StorageError;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::sqlite_error;

/// Execute a write operation inside a BEGIN IMMEDIATE transaction.
/// The write lock is taken at transaction start, so the body never hits
/// SQLITE_BUSY halfway through. Any error rolls the transaction back.
pub fn with_immediate_transaction<F, T>(conn: &Connection, f: F) -> Result<T, StorageError>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, StorageError>,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| with_context("failed to begin immediate", e))?;

    let result = f(&tx)?;

    tx.commit().map_err(|e| with_context("failed to commit", e))?;

    Ok(result)
}

/// Prefix the message of a plain SQLite error; interrupts stay typed.
fn with_context(context: &str, e: rusqlite::Error) -> StorageError {
    match sqlite_error(e) {
        StorageError::SqliteError { message } => StorageError::SqliteError {
            message: format!("{context}: {message}"),
        },
        other => other,
    }
}
