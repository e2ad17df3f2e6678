use super::gateway::SupplierGateway;
use super::models::{AssessmentStatus, RiskLevel, Supplier, User, Vendor, VendorRiskSummary};
use super::schema::FLEET_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed view over the supplier fleet.
///
/// The monitoring core only reads through [`SupplierGateway`]; the inherent
/// upsert methods exist for fleet synchronization and test seeding.
#[derive(Clone)]
pub struct SqliteSupplierGateway {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSupplierGateway {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, FLEET_VERSIONED_SCHEMAS, "fleet")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        use anyhow::Context;
        let conn = Connection::open_in_memory()?;
        FLEET_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn upsert_vendor(&self, vendor: &Vendor) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO vendors (id, name, owner_user_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, owner_user_id = excluded.owner_user_id",
            params![vendor.id, vendor.name, vendor.owner_user_id],
        )?;
        Ok(())
    }

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (id, email, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET email = excluded.email, name = excluded.name",
            params![user.id, user.email, user.name],
        )?;
        Ok(())
    }

    pub fn upsert_supplier(&self, supplier: &Supplier) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO suppliers (
                id, name, vendor_id, user_id, risk_level, contract_end_date,
                active, deleted, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                vendor_id = excluded.vendor_id,
                user_id = excluded.user_id,
                risk_level = excluded.risk_level,
                contract_end_date = excluded.contract_end_date,
                active = excluded.active,
                deleted = excluded.deleted",
            params![
                supplier.id,
                supplier.name,
                supplier.vendor_id,
                supplier.user_id,
                supplier.risk_level.as_str(),
                supplier.contract_end_date,
                supplier.active,
                supplier.deleted,
                supplier.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn add_assessment_submission(
        &self,
        supplier_id: &str,
        status: AssessmentStatus,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO assessment_submissions (supplier_id, status) VALUES (?1, ?2)",
            params![supplier_id, status.as_str()],
        )?;
        Ok(())
    }

    fn row_to_supplier(row: &rusqlite::Row) -> rusqlite::Result<Supplier> {
        Ok(Supplier {
            id: row.get("id")?,
            name: row.get("name")?,
            vendor_id: row.get("vendor_id")?,
            user_id: row.get("user_id")?,
            risk_level: RiskLevel::from_str(&row.get::<_, String>("risk_level")?)
                .unwrap_or(RiskLevel::Low),
            contract_end_date: row.get("contract_end_date")?,
            active: row.get("active")?,
            deleted: row.get("deleted")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl SupplierGateway for SqliteSupplierGateway {
    fn high_risk_suppliers(&self, limit: usize) -> Result<Vec<Supplier>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM suppliers
             WHERE risk_level IN ('HIGH', 'CRITICAL') AND active = 1 AND deleted = 0
             ORDER BY created_at ASC
             LIMIT ?1",
        )?;
        let suppliers = stmt
            .query_map(params![limit as i64], Self::row_to_supplier)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(suppliers)
    }

    fn suppliers_with_contract_ending(
        &self,
        from: i64,
        until: i64,
        limit: usize,
    ) -> Result<Vec<Supplier>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM suppliers
             WHERE contract_end_date IS NOT NULL
               AND contract_end_date >= ?1 AND contract_end_date <= ?2
               AND active = 1 AND deleted = 0
             ORDER BY contract_end_date ASC
             LIMIT ?3",
        )?;
        let suppliers = stmt
            .query_map(params![from, until, limit as i64], Self::row_to_supplier)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(suppliers)
    }

    fn suppliers_with_expired_contract(&self, now: i64, limit: usize) -> Result<Vec<Supplier>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM suppliers
             WHERE contract_end_date IS NOT NULL AND contract_end_date < ?1
               AND active = 1 AND deleted = 0
             ORDER BY contract_end_date ASC
             LIMIT ?2",
        )?;
        let suppliers = stmt
            .query_map(params![now, limit as i64], Self::row_to_supplier)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(suppliers)
    }

    fn suppliers_with_pending_assessments(&self, limit: usize) -> Result<Vec<(Supplier, i64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.*, COUNT(a.id) AS pending_count
             FROM suppliers s
             JOIN assessment_submissions a ON a.supplier_id = s.id
             WHERE a.status IN ('DRAFT', 'PENDING') AND s.active = 1 AND s.deleted = 0
             GROUP BY s.id
             ORDER BY s.created_at ASC
             LIMIT ?1",
        )?;
        let suppliers = stmt
            .query_map(params![limit as i64], |row| {
                let supplier = Self::row_to_supplier(row)?;
                let pending_count: i64 = row.get("pending_count")?;
                Ok((supplier, pending_count))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(suppliers)
    }

    fn suppliers_never_assessed(&self, limit: usize) -> Result<Vec<Supplier>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM suppliers s
             WHERE NOT EXISTS (
                SELECT 1 FROM assessment_submissions a WHERE a.supplier_id = s.id
             )
               AND s.active = 1 AND s.deleted = 0
             ORDER BY s.created_at ASC
             LIMIT ?1",
        )?;
        let suppliers = stmt
            .query_map(params![limit as i64], Self::row_to_supplier)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(suppliers)
    }

    fn critical_suppliers_with_contract_ending(
        &self,
        from: i64,
        until: i64,
        limit: usize,
    ) -> Result<Vec<Supplier>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM suppliers
             WHERE risk_level IN ('HIGH', 'CRITICAL')
               AND contract_end_date IS NOT NULL
               AND contract_end_date >= ?1 AND contract_end_date <= ?2
               AND active = 1 AND deleted = 0
             ORDER BY contract_end_date ASC
             LIMIT ?3",
        )?;
        let suppliers = stmt
            .query_map(params![from, until, limit as i64], Self::row_to_supplier)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(suppliers)
    }

    fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, email, name FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    fn get_vendor_owner(&self, vendor_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let owner = conn
            .query_row(
                "SELECT owner_user_id FROM vendors WHERE id = ?1",
                params![vendor_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    fn list_vendors(&self, limit: usize) -> Result<Vec<Vendor>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, owner_user_id FROM vendors ORDER BY created_at ASC LIMIT ?1",
        )?;
        let vendors = stmt
            .query_map(params![limit as i64], |row| {
                Ok(Vendor {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    owner_user_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(vendors)
    }

    fn vendor_risk_summary(
        &self,
        vendor_id: &str,
        now: i64,
        horizon_secs: i64,
    ) -> Result<VendorRiskSummary> {
        let conn = self.conn.lock().unwrap();
        let summary = conn.query_row(
            "SELECT
                COUNT(*),
                SUM(CASE WHEN risk_level = 'HIGH' THEN 1 ELSE 0 END),
                SUM(CASE WHEN risk_level = 'CRITICAL' THEN 1 ELSE 0 END),
                SUM(CASE WHEN contract_end_date IS NOT NULL
                          AND contract_end_date >= ?2
                          AND contract_end_date <= ?3 THEN 1 ELSE 0 END)
             FROM suppliers
             WHERE vendor_id = ?1 AND active = 1 AND deleted = 0",
            params![vendor_id, now, now + horizon_secs],
            |row| {
                Ok(VendorRiskSummary {
                    total_suppliers: row.get(0)?,
                    high_risk: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                    critical: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    expiring_contracts: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                })
            },
        )?;
        Ok(summary)
    }
}
