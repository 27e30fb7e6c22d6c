//! Migration units and the schemas their origin tables live in.

use std::fmt;
use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_64;

/// Prefix of schema aliases used for attached origin databases.
pub const ATTACHED_SCHEMA_PREFIX: &str = "reservoir_migration_";

/// Where an origin table lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Schema {
    /// The handle's own database.
    #[default]
    Main,
    /// Another database file, attached under `name`.
    Attached { name: String, path: PathBuf },
}

impl Schema {
    /// The schema for an origin database at `path`. The alias is derived
    /// from the path, so equal paths always map to equal schemas.
    pub fn attached(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let digest = xxh3_64(path.to_string_lossy().as_bytes());
        Schema::Attached {
            name: format!("{ATTACHED_SCHEMA_PREFIX}{digest:016x}"),
            path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Schema::Main => "main",
            Schema::Attached { name, .. } => name,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Schema::Main => None,
            Schema::Attached { path, .. } => Some(path),
        }
    }

    pub fn is_main(&self) -> bool {
        matches!(self, Schema::Main)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One origin → target migration unit.
///
/// The target table always lives in the handle's `main` schema. The origin
/// table lives in `main` too unless an origin database is given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationInfo {
    table: String,
    origin_table: String,
    schema: Schema,
}

impl MigrationInfo {
    /// Migrate `origin_table` into `table`, both in the same database.
    pub fn new(table: impl Into<String>, origin_table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            origin_table: origin_table.into(),
            schema: Schema::Main,
        }
    }

    /// Migrate `origin_table` of the database at `origin_database` into `table`.
    pub fn with_origin_database(
        table: impl Into<String>,
        origin_table: impl Into<String>,
        origin_database: impl Into<PathBuf>,
    ) -> Self {
        Self {
            table: table.into(),
            origin_table: origin_table.into(),
            schema: Schema::attached(origin_database),
        }
    }

    /// Target table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn origin_table(&self) -> &str {
        &self.origin_table
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl fmt::Display for MigrationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} -> main.{}", self.schema, self.origin_table, self.table)
    }
}
