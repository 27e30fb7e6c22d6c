//! SQLite connections behind pooled handles.

pub mod handle;
pub mod transaction;

pub use handle::SqliteHandle;
pub use transaction::with_immediate_transaction;

use reservoir_core::errors::StorageError;

/// Map a rusqlite error, keeping interrupts distinguishable.
pub fn sqlite_error(e: rusqlite::Error) -> StorageError {
    if e.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted) {
        StorageError::Interrupted
    } else {
        StorageError::SqliteError {
            message: e.to_string(),
        }
    }
}
