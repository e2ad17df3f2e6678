//! SQLite schema definitions for the supplier fleet database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

// =============================================================================
// Version 1 - Vendors, users, suppliers, assessment submissions
// =============================================================================

const VENDORS_TABLE_V1: Table = Table {
    name: "vendors",
    columns: &[
        sqlite_column!("id", SqlType::Text, is_primary_key = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
        sqlite_column!("owner_user_id", SqlType::Text, non_null = true),
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

const USERS_TABLE_V1: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("id", SqlType::Text, is_primary_key = true),
        sqlite_column!("email", SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
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

const SUPPLIERS_TABLE_V1: Table = Table {
    name: "suppliers",
    columns: &[
        sqlite_column!("id", SqlType::Text, is_primary_key = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
        sqlite_column!("vendor_id", SqlType::Text, non_null = true),
        sqlite_column!("user_id", SqlType::Text),
        sqlite_column!("risk_level", SqlType::Text, non_null = true),
        sqlite_column!("contract_end_date", SqlType::Integer),
        sqlite_column!("active", SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("deleted", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!(
            "created_at",
            SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_suppliers_risk_level", "risk_level, active, deleted"),
        ("idx_suppliers_contract_end", "contract_end_date"),
        ("idx_suppliers_vendor", "vendor_id"),
    ],
    unique_constraints: &[],
};

const ASSESSMENT_SUBMISSIONS_TABLE_V1: Table = Table {
    name: "assessment_submissions",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true),
        sqlite_column!("supplier_id", SqlType::Text, non_null = true),
        sqlite_column!("status", SqlType::Text, non_null = true),
        sqlite_column!(
            "submitted_at",
            SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_assessment_supplier_status", "supplier_id, status")],
    unique_constraints: &[],
};

pub const FLEET_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        VENDORS_TABLE_V1,
        USERS_TABLE_V1,
        SUPPLIERS_TABLE_V1,
        ASSESSMENT_SUBMISSIONS_TABLE_V1,
    ],
    migration: None,
}];
