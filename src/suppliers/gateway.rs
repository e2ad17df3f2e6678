use super::models::{Supplier, User, Vendor, VendorRiskSummary};
use anyhow::Result;

/// Read-only query surface over the supplier fleet, consumed by the rule
/// evaluators. All supplier queries return active, non-deleted suppliers
/// only, capped at `limit` rows.
pub trait SupplierGateway: Send + Sync {
    /// Returns suppliers with risk level HIGH or CRITICAL.
    fn high_risk_suppliers(&self, limit: usize) -> Result<Vec<Supplier>>;

    /// Returns suppliers whose contract end date falls inside [from, until],
    /// bounds in unix seconds, both inclusive.
    fn suppliers_with_contract_ending(
        &self,
        from: i64,
        until: i64,
        limit: usize,
    ) -> Result<Vec<Supplier>>;

    /// Returns suppliers whose contract end date is strictly before `now`.
    fn suppliers_with_expired_contract(&self, now: i64, limit: usize) -> Result<Vec<Supplier>>;

    /// Returns suppliers with at least one DRAFT or PENDING assessment
    /// submission, paired with the count of such submissions.
    fn suppliers_with_pending_assessments(&self, limit: usize) -> Result<Vec<(Supplier, i64)>>;

    /// Returns suppliers that have never submitted any assessment.
    fn suppliers_never_assessed(&self, limit: usize) -> Result<Vec<Supplier>>;

    /// Returns suppliers matching both conditions at once: risk level HIGH or
    /// CRITICAL and contract end date inside [from, until].
    fn critical_suppliers_with_contract_ending(
        &self,
        from: i64,
        until: i64,
        limit: usize,
    ) -> Result<Vec<Supplier>>;

    /// Returns the user with the given id.
    /// Returns Ok(None) if the user does not exist.
    fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Returns the owner user id of the given vendor.
    /// Returns Ok(None) if the vendor does not exist.
    fn get_vendor_owner(&self, vendor_id: &str) -> Result<Option<String>>;

    /// Returns all vendors, capped at `limit` rows.
    fn list_vendors(&self, limit: usize) -> Result<Vec<Vendor>>;

    /// Aggregated risk counts for one vendor's active suppliers. Contracts
    /// ending inside [now, now + horizon_secs] count as expiring.
    fn vendor_risk_summary(
        &self,
        vendor_id: &str,
        now: i64,
        horizon_secs: i64,
    ) -> Result<VendorRiskSummary>;
}
