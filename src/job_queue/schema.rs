//! SQLite schema definitions for the jobs database.

use anyhow::Result;
use rusqlite::Connection;

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

// =============================================================================
// Version 1 - Jobs table
// =============================================================================

const JOBS_TABLE_V1: Table = Table {
    name: "jobs",
    columns: &[
        sqlite_column!("id", SqlType::Text, is_primary_key = true),
        sqlite_column!("kind", SqlType::Text, non_null = true),
        sqlite_column!("queue", SqlType::Text, non_null = true),
        sqlite_column!("payload", SqlType::Text, non_null = true),
        sqlite_column!("priority", SqlType::Integer, non_null = true),
        sqlite_column!("state", SqlType::Text, non_null = true),
        sqlite_column!(
            "attempts_made",
            SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("max_attempts", SqlType::Integer, non_null = true),
        sqlite_column!("failed_reason", SqlType::Text),
        sqlite_column!("return_value", SqlType::Text),
        sqlite_column!("run_at", SqlType::Integer, non_null = true),
        sqlite_column!(
            "created_at",
            SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("started_at", SqlType::Integer),
        sqlite_column!("finished_at", SqlType::Integer),
    ],
    indices: &[
        // Claim path: waiting jobs of a queue by priority then age
        ("idx_jobs_claim", "queue, state, priority, run_at"),
        // Housekeeping: delayed promotion and stale-active recovery
        ("idx_jobs_state_run_at", "state, run_at"),
        ("idx_jobs_finished", "state, finished_at"),
    ],
    unique_constraints: &[],
};

// =============================================================================
// Version 2 - Recurring job definitions
// =============================================================================

const RECURRING_JOBS_TABLE_V2: Table = Table {
    name: "recurring_jobs",
    columns: &[
        sqlite_column!("kind", SqlType::Text, is_primary_key = true),
        sqlite_column!("queue", SqlType::Text, non_null = true),
        sqlite_column!("cron", SqlType::Text, non_null = true),
        sqlite_column!("timezone", SqlType::Text, non_null = true),
        sqlite_column!("priority", SqlType::Integer, non_null = true),
        sqlite_column!("next_run_at", SqlType::Integer, non_null = true),
        sqlite_column!("last_run_at", SqlType::Integer),
        sqlite_column!(
            "created_at",
            SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_recurring_next_run", "next_run_at")],
    unique_constraints: &[],
};

fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    RECURRING_JOBS_TABLE_V2.create(conn)
}

pub const JOBS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[JOBS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[JOBS_TABLE_V1, RECURRING_JOBS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_persistence::BASE_DB_VERSION;

    #[test]
    fn test_latest_schema_creates_and_validates() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = JOBS_VERSIONED_SCHEMAS.last().unwrap();
        schema.create(&conn).unwrap();
        schema.validate(&conn).unwrap();
    }

    #[test]
    fn test_all_schema_versions_create_and_validate() {
        for schema in JOBS_VERSIONED_SCHEMAS {
            let conn = Connection::open_in_memory().unwrap();
            schema.create(&conn).unwrap();
            schema.validate(&conn).unwrap();
        }
    }

    #[test]
    fn test_migration_from_v1_preserves_jobs() {
        let conn = Connection::open_in_memory().unwrap();
        JOBS_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
        conn.execute(
            "INSERT INTO jobs (id, kind, queue, payload, priority, state, max_attempts, run_at)
             VALUES ('j1', 'high_risk_scan', 'high-risk', '{}', 2, 'waiting', 3, 0)",
            [],
        )
        .unwrap();

        migrate_v1_to_v2(&conn).unwrap();
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + 2),
            [],
        )
        .unwrap();
        JOBS_VERSIONED_SCHEMAS[1].validate(&conn).unwrap();

        let state: String = conn
            .query_row("SELECT state FROM jobs WHERE id = 'j1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(state, "waiting");
    }
}
