//! Weekly fleet digest per vendor owner.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::notifications::{NotificationPriority, NotificationRequest, NotificationType};
use crate::suppliers::SupplierGateway;

use super::{deliver, ScanContext, ScanError, ScanReport};

const EXPIRING_HORIZON_DAYS: i64 = 30;
const SECONDS_PER_DAY: i64 = 86_400;

/// Sends each vendor owner a digest of their suppliers' risk standing.
/// Vendors without suppliers are skipped; no dedup window applies, the
/// weekly cadence is its own spacing.
pub async fn run(ctx: &ScanContext) -> Result<ScanReport, ScanError> {
    let now = Utc::now();
    let vendors = ctx.gateway.list_vendors(ctx.batch_size)?;

    let mut report = ScanReport {
        scanned: vendors.len(),
        ..Default::default()
    };

    for vendor in &vendors {
        let summary = ctx.gateway.vendor_risk_summary(
            &vendor.id,
            now.timestamp(),
            EXPIRING_HORIZON_DAYS * SECONDS_PER_DAY,
        )?;
        if summary.total_suppliers == 0 {
            continue;
        }
        report.matched += 1;

        let message = if summary.is_all_clear() {
            format!(
                "All {} suppliers of {} look clear this week.",
                summary.total_suppliers, vendor.name
            )
        } else {
            format!(
                "{}: {} high risk, {} critical, {} contracts expiring within {} days.",
                vendor.name,
                summary.high_risk,
                summary.critical,
                summary.expiring_contracts,
                EXPIRING_HORIZON_DAYS
            )
        };

        let request = NotificationRequest {
            user_id: vendor.owner_user_id.clone(),
            notification_type: NotificationType::WeeklyReport,
            title: format!("Weekly supplier report: {}", vendor.name),
            message,
            metadata: json!({
                "vendorId": vendor.id,
                "totalSuppliers": summary.total_suppliers,
                "highRisk": summary.high_risk,
                "critical": summary.critical,
                "expiringContracts": summary.expiring_contracts,
            }),
            priority: NotificationPriority::Low,
        };
        deliver(ctx, &mut report, request, now, false).await;
    }

    info!(
        vendors = report.scanned,
        notified = report.notified,
        "Weekly report scan finished"
    );
    Ok(report)
}
