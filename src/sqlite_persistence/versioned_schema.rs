use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::info;

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

/// Databases created before versioning carry a user_version of 0, so real
/// versions are offset to stay distinguishable from them.
pub const BASE_DB_VERSION: usize = 99999;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Allow unused_mut because the variable is only mutated when optional
            // field assignments are passed to the macro (e.g., `is_primary_key = true`)
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(SqlType::Text),
            "INTEGER" => Some(SqlType::Integer),
            "REAL" => Some(SqlType::Real),
            "BLOB" => Some(SqlType::Blob),
            _ => None,
        }
    }
}

pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<&'static str>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut defs: Vec<String> = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            let mut def = format!("{} {}", column.name, column.sql_type.as_sql());
            if column.is_primary_key {
                def.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                def.push_str(" NOT NULL");
            }
            if column.is_unique {
                def.push_str(" UNIQUE");
            }
            if let Some(default_value) = column.default_value {
                def.push_str(&format!(" DEFAULT {}", default_value));
            }
            defs.push(def);
        }
        for unique_constraint in self.unique_constraints {
            defs.push(format!("UNIQUE ({})", unique_constraint.join(", ")));
        }

        conn.execute(
            &format!("CREATE TABLE {} ({});", self.name, defs.join(", ")),
            params![],
        )?;

        for (index_name, index_columns) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, index_columns
                ),
                params![],
            )?;
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

struct ActualColumn {
    name: String,
    sql_type: Option<SqlType>,
    non_null: bool,
    default_value: Option<String>,
    is_primary_key: bool,
}

fn strip_outer_parentheses(s: &str) -> &str {
    if s.starts_with('(') && s.ends_with(')') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            self.validate_columns(conn, table)?;
            self.validate_indices(conn, table)?;
            self.validate_unique(conn, table)?;
        }
        Ok(())
    }

    fn validate_columns(&self, conn: &Connection, table: &Table) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table.name))?;
        let actual_columns: Vec<ActualColumn> = stmt
            .query_map(params![], |row| {
                Ok(ActualColumn {
                    name: row.get(1)?,
                    sql_type: SqlType::parse(row.get::<_, String>(2)?.as_str()),
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        if actual_columns.len() != table.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found column names: {}, expected: {}",
                table.name,
                actual_columns.len(),
                table.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                table
                    .columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in actual_columns.iter().zip(table.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    table.name,
                    expected.name,
                    actual.name
                );
            }
            if actual.sql_type != Some(expected.sql_type) {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {:?}",
                    table.name,
                    expected.name,
                    expected.sql_type,
                    actual.sql_type
                );
            }
            if actual.non_null != expected.non_null {
                bail!(
                    "Table {} column {} non-null mismatch: expected {}, got {}",
                    table.name,
                    expected.name,
                    expected.non_null,
                    actual.non_null
                );
            }
            // Default values may come back wrapped in parentheses
            if actual.default_value.as_deref().map(strip_outer_parentheses)
                != expected.default_value.map(strip_outer_parentheses)
            {
                bail!(
                    "Table {} column {} default value mismatch: expected {:?}, got {:?}",
                    table.name,
                    expected.name,
                    expected.default_value,
                    actual.default_value
                );
            }
            if actual.is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} column {} primary key mismatch: expected {}, got {}",
                    table.name,
                    expected.name,
                    expected.is_primary_key,
                    actual.is_primary_key
                );
            }
        }
        Ok(())
    }

    fn validate_indices(&self, conn: &Connection, table: &Table) -> Result<()> {
        for (index_name, _columns) in table.indices {
            let index_exists: bool = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, table.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);

            if !index_exists {
                bail!("Table {} is missing index '{}'", table.name, index_name);
            }
        }
        Ok(())
    }

    // SQLite surfaces both column-level UNIQUE and table-level UNIQUE(...)
    // constraints as unique indices in PRAGMA index_list.
    fn validate_unique(&self, conn: &Connection, table: &Table) -> Result<()> {
        let mut expected_sets: Vec<Vec<&str>> = Vec::new();
        for column in table.columns {
            if column.is_unique {
                expected_sets.push(vec![column.name]);
            }
        }
        for unique_constraint in table.unique_constraints {
            let mut cols: Vec<&str> = unique_constraint.to_vec();
            cols.sort_unstable();
            expected_sets.push(cols);
        }
        if expected_sets.is_empty() {
            return Ok(());
        }

        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", table.name))?;
        let unique_indices: Vec<String> = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let is_unique: i32 = row.get(2)?;
                Ok((name, is_unique))
            })?
            .filter_map(|r| r.ok())
            .filter(|(_, is_unique)| *is_unique == 1)
            .map(|(name, _)| name)
            .collect();

        let mut actual_sets: Vec<Vec<String>> = Vec::new();
        for index_name in &unique_indices {
            let mut idx_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
            let mut cols: Vec<String> = idx_stmt
                .query_map([], |row| row.get::<_, String>(2))?
                .filter_map(|r| r.ok())
                .collect();
            cols.sort_unstable();
            actual_sets.push(cols);
        }

        for expected in &expected_sets {
            let found = actual_sets
                .iter()
                .any(|actual| actual.iter().map(String::as_str).eq(expected.iter().copied()));
            if !found {
                bail!(
                    "Table {} is missing unique constraint on columns ({})",
                    table.name,
                    expected.join(", ")
                );
            }
        }
        Ok(())
    }
}

/// Opens a database file and brings it to the latest schema version.
///
/// A missing file is created directly at the latest version. An existing file
/// has its stored version validated against the matching schema definition and
/// is then migrated forward, one version at a time, inside a transaction.
pub fn open_versioned<P: AsRef<Path>>(
    db_path: P,
    schemas: &[VersionedSchema],
    label: &str,
) -> Result<Connection> {
    let path = db_path.as_ref();
    let is_new_db = !path.exists();

    let mut conn = Connection::open(path)
        .with_context(|| format!("Failed to open {} database at {:?}", label, path))?;

    let latest = schemas
        .last()
        .with_context(|| format!("No schema versions defined for {} database", label))?;

    if is_new_db {
        info!("Creating new {} database at {:?}", label, path);
        latest.create(&conn)?;
        return Ok(conn);
    }

    let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let db_version = raw_version - BASE_DB_VERSION as i64;
    if db_version < 1 {
        bail!(
            "{} database version {} is invalid (expected >= 1)",
            label,
            db_version
        );
    }

    let schema = schemas
        .iter()
        .find(|s| s.version == db_version as usize)
        .with_context(|| format!("Unknown {} database version {}", label, db_version))?;
    schema.validate(&conn).with_context(|| {
        format!(
            "{} database schema validation failed for version {}",
            label, db_version
        )
    })?;

    if (db_version as usize) < latest.version {
        info!(
            "Migrating {} database from version {} to {}",
            label, db_version, latest.version
        );
        run_migrations(&mut conn, schemas, db_version as usize, label)?;
    }

    Ok(conn)
}

fn run_migrations(
    conn: &mut Connection,
    schemas: &[VersionedSchema],
    from_version: usize,
    label: &str,
) -> Result<()> {
    let tx = conn.transaction()?;
    let mut reached = from_version;
    for schema in schemas.iter().filter(|s| s.version > from_version) {
        if let Some(migration_fn) = schema.migration {
            migration_fn(&tx).with_context(|| {
                format!(
                    "Failed to run {} migration to version {}",
                    label, schema.version
                )
            })?;
        }
        reached = schema.version;
    }
    tx.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + reached),
        [],
    )?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TABLE: Table = Table {
        name: "widgets",
        columns: &[
            sqlite_column!("id", SqlType::Integer, is_primary_key = true),
            sqlite_column!("name", SqlType::Text, non_null = true),
            sqlite_column!("weight", SqlType::Real),
        ],
        indices: &[("idx_widgets_name", "name")],
        unique_constraints: &[],
    };

    const TEST_SCHEMA_V1: VersionedSchema = VersionedSchema {
        version: 1,
        tables: &[TEST_TABLE],
        migration: None,
    };

    #[test]
    fn test_create_then_validate_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        TEST_SCHEMA_V1.create(&conn).unwrap();
        TEST_SCHEMA_V1.validate(&conn).unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, BASE_DB_VERSION as i64 + 1);
    }

    #[test]
    fn test_validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL, weight REAL)",
            [],
        )
        .unwrap();

        let result = TEST_SCHEMA_V1.validate(&conn);
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("missing index"));
        assert!(err_msg.contains("idx_widgets_name"));
    }

    #[test]
    fn test_validate_detects_index_on_wrong_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL, weight REAL)",
            [],
        )
        .unwrap();
        conn.execute("CREATE TABLE other (name TEXT)", []).unwrap();
        conn.execute("CREATE INDEX idx_widgets_name ON other(name)", [])
            .unwrap();

        let result = TEST_SCHEMA_V1.validate(&conn);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("missing index"));
    }

    #[test]
    fn test_validate_detects_column_type_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name INTEGER NOT NULL, weight REAL)",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_widgets_name ON widgets(name)", [])
            .unwrap();

        let result = TEST_SCHEMA_V1.validate(&conn);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("type mismatch"));
    }

    #[test]
    fn test_validate_detects_missing_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            [],
        )
        .unwrap();

        let result = TEST_SCHEMA_V1.validate(&conn);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("has 2 columns"));
    }

    const UNIQUE_TABLE: Table = Table {
        name: "accounts",
        columns: &[
            sqlite_column!("id", SqlType::Integer, is_primary_key = true),
            sqlite_column!("email", SqlType::Text, non_null = true, is_unique = true),
            sqlite_column!("org", SqlType::Text, non_null = true),
            sqlite_column!("handle", SqlType::Text, non_null = true),
        ],
        indices: &[],
        unique_constraints: &[&["org", "handle"]],
    };

    const UNIQUE_SCHEMA: VersionedSchema = VersionedSchema {
        version: 1,
        tables: &[UNIQUE_TABLE],
        migration: None,
    };

    #[test]
    fn test_unique_constraints_create_and_validate() {
        let conn = Connection::open_in_memory().unwrap();
        UNIQUE_SCHEMA.create(&conn).unwrap();
        UNIQUE_SCHEMA.validate(&conn).unwrap();
    }

    #[test]
    fn test_validate_unique_constraint_column_order_independent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE accounts (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                org TEXT NOT NULL,
                handle TEXT NOT NULL,
                UNIQUE (handle, org)
            )",
            [],
        )
        .unwrap();

        UNIQUE_SCHEMA.validate(&conn).unwrap();
    }

    #[test]
    fn test_validate_detects_missing_unique_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE accounts (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                org TEXT NOT NULL,
                handle TEXT NOT NULL
            )",
            [],
        )
        .unwrap();

        let result = UNIQUE_SCHEMA.validate(&conn);
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("missing unique constraint"));
        assert!(err_msg.contains("handle"));
        assert!(err_msg.contains("org"));
    }

    #[test]
    fn test_validate_detects_missing_column_unique() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE accounts (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL,
                org TEXT NOT NULL,
                handle TEXT NOT NULL,
                UNIQUE (org, handle)
            )",
            [],
        )
        .unwrap();

        let result = UNIQUE_SCHEMA.validate(&conn);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("missing unique constraint"));
    }

    const DEFAULT_TABLE: Table = Table {
        name: "stamped",
        columns: &[
            sqlite_column!("id", SqlType::Integer, is_primary_key = true),
            sqlite_column!(
                "created_at",
                SqlType::Integer,
                non_null = true,
                default_value = Some(DEFAULT_TIMESTAMP)
            ),
        ],
        indices: &[],
        unique_constraints: &[],
    };

    #[test]
    fn test_default_value_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = VersionedSchema {
            version: 1,
            tables: &[DEFAULT_TABLE],
            migration: None,
        };
        schema.create(&conn).unwrap();
        schema.validate(&conn).unwrap();

        conn.execute("INSERT INTO stamped (id) VALUES (1)", [])
            .unwrap();
        let created_at: i64 = conn
            .query_row("SELECT created_at FROM stamped WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(created_at > 0);
    }

    mod open_versioned_tests {
        use super::*;
        use tempfile::TempDir;

        const THINGS_V1: Table = Table {
            name: "things",
            columns: &[
                sqlite_column!("id", SqlType::Text, is_primary_key = true),
                sqlite_column!("label", SqlType::Text, non_null = true),
            ],
            indices: &[],
            unique_constraints: &[],
        };

        const THINGS_V2: Table = Table {
            name: "things",
            columns: &[
                sqlite_column!("id", SqlType::Text, is_primary_key = true),
                sqlite_column!("label", SqlType::Text, non_null = true),
                sqlite_column!("rank", SqlType::Integer, non_null = true, default_value = Some("0")),
            ],
            indices: &[],
            unique_constraints: &[],
        };

        fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
            conn.execute(
                "ALTER TABLE things ADD COLUMN rank INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
            Ok(())
        }

        const SCHEMAS: &[VersionedSchema] = &[
            VersionedSchema {
                version: 1,
                tables: &[THINGS_V1],
                migration: None,
            },
            VersionedSchema {
                version: 2,
                tables: &[THINGS_V2],
                migration: Some(migrate_v1_to_v2),
            },
        ];

        #[test]
        fn test_fresh_database_created_at_latest_version() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("test.db");

            let conn = open_versioned(&path, SCHEMAS, "test").unwrap();
            let version: i64 = conn
                .query_row("PRAGMA user_version;", [], |row| row.get(0))
                .unwrap();
            assert_eq!(version, BASE_DB_VERSION as i64 + 2);
            SCHEMAS.last().unwrap().validate(&conn).unwrap();
        }

        #[test]
        fn test_reopen_validates_existing_database() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("test.db");

            drop(open_versioned(&path, SCHEMAS, "test").unwrap());
            open_versioned(&path, SCHEMAS, "test").unwrap();
        }

        #[test]
        fn test_migration_runs_from_old_version() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("test.db");

            // Seed a v1 database by hand
            {
                let conn = Connection::open(&path).unwrap();
                SCHEMAS[0].create(&conn).unwrap();
                conn.execute(
                    "INSERT INTO things (id, label) VALUES ('a', 'first')",
                    [],
                )
                .unwrap();
            }

            let conn = open_versioned(&path, SCHEMAS, "test").unwrap();
            let version: i64 = conn
                .query_row("PRAGMA user_version;", [], |row| row.get(0))
                .unwrap();
            assert_eq!(version, BASE_DB_VERSION as i64 + 2);

            // Existing rows survive, new column has its default
            let rank: i64 = conn
                .query_row("SELECT rank FROM things WHERE id = 'a'", [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(rank, 0);
        }

        #[test]
        fn test_unversioned_database_rejected() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("test.db");

            {
                let conn = Connection::open(&path).unwrap();
                conn.execute("CREATE TABLE things (id TEXT PRIMARY KEY, label TEXT NOT NULL)", [])
                    .unwrap();
            }

            let result = open_versioned(&path, SCHEMAS, "test");
            assert!(result.is_err());
            assert!(result.unwrap_err().to_string().contains("invalid"));
        }

        #[test]
        fn test_unknown_version_rejected() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("test.db");

            {
                let conn = Connection::open(&path).unwrap();
                conn.execute(
                    &format!("PRAGMA user_version = {}", BASE_DB_VERSION + 7),
                    [],
                )
                .unwrap();
            }

            let result = open_versioned(&path, SCHEMAS, "test");
            assert!(result.is_err());
            assert!(result
                .unwrap_err()
                .to_string()
                .contains("Unknown test database version"));
        }
    }
}
