//! A lazily opened SQLite connection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use reservoir_core::config::SqliteConfig;
use reservoir_core::errors::StorageError;
use rusqlite::{Connection, InterruptHandle};

use super::sqlite_error;

/// One connection to a database file.
///
/// The connection is used by one caller at a time (its mutex serializes
/// use); `interrupt` goes through a separate handle and is safe to call from
/// any thread while a statement runs.
pub struct SqliteHandle {
    path: PathBuf,
    config: SqliteConfig,
    conn: Mutex<Option<Connection>>,
    interrupt: Mutex<Option<InterruptHandle>>,
}

impl SqliteHandle {
    pub fn new(path: impl Into<PathBuf>, config: SqliteConfig) -> Self {
        Self {
            path: path.into(),
            config,
            conn: Mutex::new(None),
            interrupt: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the connection. Idempotent.
    pub fn open(&self) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();
        if conn.is_some() {
            return Ok(());
        }
        let opened = Connection::open(&self.path).map_err(|e| StorageError::SqliteError {
            message: format!("failed to open {}: {e}", self.path.display()),
        })?;
        *self.interrupt.lock() = Some(opened.get_interrupt_handle());
        *conn = Some(opened);
        tracing::debug!(path = %self.path.display(), "opened sqlite handle");
        Ok(())
    }

    pub fn is_opened(&self) -> bool {
        self.conn.lock().is_some()
    }

    pub fn close(&self) {
        let closed = self.conn.lock().take();
        *self.interrupt.lock() = None;
        if closed.is_some() {
            tracing::debug!(path = %self.path.display(), "closed sqlite handle");
        }
    }

    /// Apply the configured PRAGMAs. The handle must be open.
    pub fn configure(&self) -> Result<(), StorageError> {
        self.with_connection(|conn| {
            conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))
                .map_err(sqlite_error)?;
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", &self.config.journal_mode, |row| {
                    row.get(0)
                })
                .map_err(sqlite_error)?;
            conn.pragma_update(None, "synchronous", &self.config.synchronous)
                .map_err(sqlite_error)?;
            tracing::trace!(path = %self.path.display(), journal_mode = %mode, "configured sqlite handle");
            Ok(())
        })
    }

    /// Cancel whatever statement is running on this connection, if any.
    pub fn interrupt(&self) {
        if let Some(handle) = self.interrupt.lock().as_ref() {
            handle.interrupt();
        }
    }

    /// Run `f` against the open connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let conn = self.conn.lock();
        let conn = conn.as_ref().ok_or_else(|| StorageError::NotOpened {
            path: self.path.display().to_string(),
        })?;
        f(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(dir: &tempfile::TempDir) -> SqliteHandle {
        SqliteHandle::new(dir.path().join("test.db"), SqliteConfig::default())
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let handle = handle(&dir);
        assert!(!handle.is_opened());
        handle.open().unwrap();
        handle.open().unwrap();
        assert!(handle.is_opened());
        handle.close();
        assert!(!handle.is_opened());
    }

    #[test]
    fn test_unopened_handle_rejects_work() {
        let dir = tempfile::tempdir().unwrap();
        let err = handle(&dir).with_connection(|_| Ok(())).unwrap_err();
        assert!(matches!(err, StorageError::NotOpened { .. }));
    }

    #[test]
    fn test_configure_applies_wal() {
        let dir = tempfile::tempdir().unwrap();
        let handle = handle(&dir);
        handle.open().unwrap();
        handle.configure().unwrap();
        let mode: String = handle
            .with_connection(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))
                    .map_err(sqlite_error)
            })
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_open_failure_is_reported() {
        let handle = SqliteHandle::new("/nonexistent/dir/test.db", SqliteConfig::default());
        let err = handle.open().unwrap_err();
        assert!(matches!(err, StorageError::SqliteError { .. }));
    }

    #[test]
    fn test_interrupt_without_connection_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        handle(&dir).interrupt();
    }
}
