//! SQL behind the migration stepper: attach/detach, batch moves, drops.

use std::path::Path;

use reservoir_core::errors::StorageError;
use reservoir_core::MigrationInfo;
use rusqlite::{params, Connection, OptionalExtension};

use crate::connection::sqlite_error;

/// Quote an identifier for interpolation into SQL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

pub fn attach(conn: &Connection, path: &Path, schema: &str) -> Result<(), StorageError> {
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {}", quote_identifier(schema)),
        params![path.to_string_lossy().into_owned()],
    )
    .map_err(sqlite_error)?;
    Ok(())
}

pub fn detach(conn: &Connection, schema: &str) -> Result<(), StorageError> {
    conn.execute_batch(&format!("DETACH DATABASE {}", quote_identifier(schema)))
        .map_err(sqlite_error)
}

/// A column of the origin table.
#[derive(Debug, Clone)]
struct Column {
    name: String,
    declared_type: String,
    pk: i64,
}

fn origin_columns(conn: &Connection, info: &MigrationInfo) -> Result<Vec<Column>, StorageError> {
    let mut stmt = conn
        .prepare(&format!(
            "PRAGMA {}.table_info({})",
            quote_identifier(info.schema().name()),
            quote_identifier(info.origin_table())
        ))
        .map_err(sqlite_error)?;

    let rows = stmt
        .query_map([], |row| {
            Ok(Column {
                name: row.get(1)?,
                declared_type: row.get(2)?,
                pk: row.get(5)?,
            })
        })
        .map_err(sqlite_error)?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(sqlite_error)?);
    }
    if columns.is_empty() {
        return Err(StorageError::sqlite(format!(
            "no such table: {}.{}",
            info.schema().name(),
            info.origin_table()
        )));
    }
    Ok(columns)
}

/// Whether one column is an alias of the rowid.
fn has_rowid_alias(columns: &[Column]) -> bool {
    let mut pks = columns.iter().filter(|c| c.pk > 0);
    match (pks.next(), pks.next()) {
        (Some(pk), None) => pk.declared_type.eq_ignore_ascii_case("INTEGER"),
        _ => false,
    }
}

/// Move up to `limit` rows, highest rowids first, from the origin table into
/// the target table. Must run inside a transaction so copy and delete commit
/// together. Returns the number of rows moved and whether the origin is now
/// empty.
pub fn migrate_batch(
    conn: &Connection,
    info: &MigrationInfo,
    limit: usize,
) -> Result<(usize, bool), StorageError> {
    let columns = origin_columns(conn, info)?;
    let mut column_list = columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    if !has_rowid_alias(&columns) {
        column_list = format!("rowid, {column_list}");
    }

    let origin = qualified(info.schema().name(), info.origin_table());
    let target = qualified("main", info.table());
    let offset = i64::try_from(limit.saturating_sub(1)).unwrap_or(i64::MAX);

    let floor: i64 = conn
        .query_row(
            &format!("SELECT rowid FROM {origin} ORDER BY rowid DESC LIMIT 1 OFFSET ?1"),
            params![offset],
            |row| row.get(0),
        )
        .optional()
        .map_err(sqlite_error)?
        .unwrap_or(i64::MIN);

    let moved = conn
        .execute(
            &format!(
                "INSERT OR REPLACE INTO {target}({column_list})
                 SELECT {column_list} FROM {origin} WHERE rowid >= ?1"
            ),
            params![floor],
        )
        .map_err(sqlite_error)?;

    conn.execute(&format!("DELETE FROM {origin} WHERE rowid >= ?1"), params![floor])
        .map_err(sqlite_error)?;

    Ok((moved, origin_is_empty(conn, info)?))
}

/// Whether `info`'s origin table has no rows left.
pub fn origin_is_empty(conn: &Connection, info: &MigrationInfo) -> Result<bool, StorageError> {
    let origin = qualified(info.schema().name(), info.origin_table());
    let remaining: bool = conn
        .query_row(&format!("SELECT EXISTS(SELECT 1 FROM {origin})"), [], |row| {
            row.get(0)
        })
        .map_err(sqlite_error)?;
    Ok(!remaining)
}

pub fn drop_origin_table(conn: &Connection, info: &MigrationInfo) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {}",
        qualified(info.schema().name(), info.origin_table())
    ))
    .map_err(sqlite_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(rows: i64) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE origin (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE target (id INTEGER PRIMARY KEY, name TEXT);",
        )
        .unwrap();
        for i in 1..=rows {
            conn.execute("INSERT INTO origin VALUES (?1, ?2)", params![i, format!("row-{i}")])
                .unwrap();
        }
        conn
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_batch_moves_highest_rowids_first() {
        let conn = seeded(5);
        let info = MigrationInfo::new("target", "origin");
        let (moved, done) = migrate_batch(&conn, &info, 2).unwrap();
        assert_eq!((moved, done), (2, false));
        let ids: Vec<i64> = conn
            .prepare("SELECT id FROM target ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids, vec![4, 5]);
        assert_eq!(count(&conn, "origin"), 3);
    }

    #[test]
    fn test_short_batch_finishes() {
        let conn = seeded(3);
        let info = MigrationInfo::new("target", "origin");
        assert_eq!(migrate_batch(&conn, &info, 10).unwrap(), (3, true));
        assert_eq!(count(&conn, "target"), 3);
    }

    #[test]
    fn test_empty_origin_is_done() {
        let conn = seeded(0);
        let info = MigrationInfo::new("target", "origin");
        assert_eq!(migrate_batch(&conn, &info, 10).unwrap(), (0, true));
    }

    #[test]
    fn test_rowid_preserved_without_alias() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE origin (name TEXT);
             CREATE TABLE target (name TEXT);
             INSERT INTO origin(rowid, name) VALUES (10, 'a'), (20, 'b');",
        )
        .unwrap();
        let info = MigrationInfo::new("target", "origin");
        assert_eq!(migrate_batch(&conn, &info, 10).unwrap(), (2, true));
        let rowids: Vec<i64> = conn
            .prepare("SELECT rowid FROM target ORDER BY rowid")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rowids, vec![10, 20]);
    }

    #[test]
    fn test_missing_origin_table() {
        let conn = seeded(0);
        let info = MigrationInfo::new("target", "nope");
        let err = migrate_batch(&conn, &info, 10).unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn test_drop_origin_table() {
        let conn = seeded(0);
        let info = MigrationInfo::new("target", "origin");
        drop_origin_table(&conn, &info).unwrap();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = 'origin')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(!exists);
    }
}
