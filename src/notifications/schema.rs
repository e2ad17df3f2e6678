//! SQLite schema definitions for the notifications database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

// =============================================================================
// Version 1 - Notifications and preferences
// =============================================================================

/// Notification records. entity_id mirrors metadata.supplierId so the dedup
/// lookup can use an index instead of parsing JSON.
const NOTIFICATIONS_TABLE_V1: Table = Table {
    name: "notifications",
    columns: &[
        sqlite_column!("id", SqlType::Text, is_primary_key = true),
        sqlite_column!("user_id", SqlType::Text, non_null = true),
        sqlite_column!("notification_type", SqlType::Text, non_null = true),
        sqlite_column!("title", SqlType::Text, non_null = true),
        sqlite_column!("message", SqlType::Text, non_null = true),
        sqlite_column!("metadata", SqlType::Text, non_null = true),
        sqlite_column!("entity_id", SqlType::Text),
        sqlite_column!("priority", SqlType::Text, non_null = true),
        sqlite_column!("is_read", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("is_deleted", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!(
            "created_at",
            SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_notifications_user_created", "user_id, created_at DESC"),
        (
            "idx_notifications_dedup",
            "user_id, notification_type, entity_id, created_at",
        ),
    ],
    unique_constraints: &[],
};

const PREFERENCES_TABLE_V1: Table = Table {
    name: "notification_preferences",
    columns: &[
        sqlite_column!("user_id", SqlType::Text, is_primary_key = true),
        sqlite_column!("risk_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("contract_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("assessment_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("problem_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("report_notifications", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("payment_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("system_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("email_enabled", SqlType::Integer, non_null = true, default_value = Some("1")),
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

// =============================================================================
// Version 2 - Quiet hours columns on preferences
// =============================================================================

const PREFERENCES_TABLE_V2: Table = Table {
    name: "notification_preferences",
    columns: &[
        sqlite_column!("user_id", SqlType::Text, is_primary_key = true),
        sqlite_column!("risk_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("contract_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("assessment_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("problem_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("report_notifications", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("payment_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("system_alerts", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("email_enabled", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!(
            "created_at",
            SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        // Appended by the v1 -> v2 migration, so they sit after created_at
        sqlite_column!("quiet_hours_start", SqlType::Integer),
        sqlite_column!("quiet_hours_end", SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Migration from version 1 to version 2: add quiet hours columns.
fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute(
        "ALTER TABLE notification_preferences ADD COLUMN quiet_hours_start INTEGER",
        [],
    )?;
    conn.execute(
        "ALTER TABLE notification_preferences ADD COLUMN quiet_hours_end INTEGER",
        [],
    )?;
    Ok(())
}

pub const NOTIFICATIONS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[NOTIFICATIONS_TABLE_V1, PREFERENCES_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[NOTIFICATIONS_TABLE_V1, PREFERENCES_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
