//! Domain models for the monitored supplier fleet.

use chrono::{DateTime, Utc};

/// Risk classification assigned to a supplier by the external scoring pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(RiskLevel::Low),
            "MEDIUM" => Some(RiskLevel::Medium),
            "HIGH" => Some(RiskLevel::High),
            "CRITICAL" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    /// High and critical levels are the ones the monitoring scans act on.
    pub fn is_high_risk(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

/// Status of a single assessment submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentStatus {
    Draft,
    Pending,
    Submitted,
    Approved,
    Rejected,
}

impl AssessmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::Draft => "DRAFT",
            AssessmentStatus::Pending => "PENDING",
            AssessmentStatus::Submitted => "SUBMITTED",
            AssessmentStatus::Approved => "APPROVED",
            AssessmentStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(AssessmentStatus::Draft),
            "PENDING" => Some(AssessmentStatus::Pending),
            "SUBMITTED" => Some(AssessmentStatus::Submitted),
            "APPROVED" => Some(AssessmentStatus::Approved),
            "REJECTED" => Some(AssessmentStatus::Rejected),
            _ => None,
        }
    }

    /// Draft and pending submissions still need action from the supplier.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, AssessmentStatus::Draft | AssessmentStatus::Pending)
    }
}

/// A stakeholder account that can receive notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// A vendor owning one or more suppliers. The owner user receives
/// fleet-level notifications for the vendor's suppliers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    pub id: String,
    pub name: String,
    pub owner_user_id: String,
}

/// A monitored supplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub vendor_id: String,
    /// The supplier's own account, if it has one.
    pub user_id: Option<String>,
    pub risk_level: RiskLevel,
    /// Contract end, unix seconds. None when no contract is on file.
    pub contract_end_date: Option<i64>,
    pub active: bool,
    pub deleted: bool,
    pub created_at: i64,
}

impl Supplier {
    pub fn new(id: String, name: String, vendor_id: String, risk_level: RiskLevel) -> Self {
        Self {
            id,
            name,
            vendor_id,
            user_id: None,
            risk_level,
            contract_end_date: None,
            active: true,
            deleted: false,
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn with_user(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_contract_end(mut self, contract_end_date: i64) -> Self {
        self.contract_end_date = Some(contract_end_date);
        self
    }

    /// Whole days between today and the contract end date, both taken as
    /// UTC calendar dates. Negative when the contract has already ended,
    /// None when no contract is on file.
    pub fn contract_days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        let end = DateTime::from_timestamp(self.contract_end_date?, 0)?;
        Some((end.date_naive() - now.date_naive()).num_days())
    }
}

/// Per-vendor aggregate used by the weekly report scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorRiskSummary {
    pub total_suppliers: i64,
    pub high_risk: i64,
    pub critical: i64,
    pub expiring_contracts: i64,
}

impl VendorRiskSummary {
    /// Nothing flagged for this vendor's fleet.
    pub fn is_all_clear(&self) -> bool {
        self.high_risk == 0 && self.critical == 0 && self.expiring_contracts == 0
    }
}
