mod gateway;
mod models;
mod schema;
mod sqlite_gateway;

pub use gateway::SupplierGateway;
pub use models::{AssessmentStatus, RiskLevel, Supplier, User, Vendor, VendorRiskSummary};
pub use sqlite_gateway::SqliteSupplierGateway;
