//! High-risk supplier scan.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::notifications::{NotificationPriority, NotificationRequest, NotificationType};
use crate::suppliers::SupplierGateway;

use super::{deliver, recipients_for, ScanContext, ScanError, ScanReport};

/// Notifies the vendor owner and the supplier's own user for every active
/// supplier rated HIGH or CRITICAL.
pub async fn run(ctx: &ScanContext) -> Result<ScanReport, ScanError> {
    let now = Utc::now();
    let suppliers = ctx.gateway.high_risk_suppliers(ctx.batch_size)?;

    let mut report = ScanReport {
        scanned: suppliers.len(),
        ..Default::default()
    };

    for supplier in &suppliers {
        report.matched += 1;
        let recipients = recipients_for(ctx.gateway.as_ref(), supplier, true, true)?;
        for user_id in recipients {
            let request = NotificationRequest {
                user_id,
                notification_type: NotificationType::RiskAlert,
                title: format!("High risk supplier: {}", supplier.name),
                message: format!(
                    "Supplier {} is rated {}. Review the relationship and current mitigations.",
                    supplier.name,
                    supplier.risk_level.as_str()
                ),
                metadata: json!({
                    "supplierId": supplier.id,
                    "riskLevel": supplier.risk_level.as_str(),
                }),
                priority: NotificationPriority::High,
            };
            deliver(ctx, &mut report, request, now, false).await;
        }
    }

    info!(
        scanned = report.scanned,
        notified = report.notified,
        deduplicated = report.deduplicated,
        "High-risk scan finished"
    );
    Ok(report)
}
