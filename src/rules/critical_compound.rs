//! Compound escalation: high risk and an imminent contract end together.

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::info;

use crate::notifications::{NotificationPriority, NotificationRequest, NotificationType};
use crate::suppliers::SupplierGateway;

use super::{deliver, recipients_for, ScanContext, ScanError, ScanReport};

const COMPOUND_WINDOW_DAYS: i64 = 15;

/// Notifies on suppliers that are HIGH or CRITICAL while their contract ends
/// within fifteen days. Fires on every run until the condition clears.
pub async fn run(ctx: &ScanContext) -> Result<ScanReport, ScanError> {
    let now = Utc::now();
    let until = now + Duration::days(COMPOUND_WINDOW_DAYS);
    let suppliers = ctx.gateway.critical_suppliers_with_contract_ending(
        now.timestamp(),
        until.timestamp(),
        ctx.batch_size,
    )?;

    let mut report = ScanReport {
        scanned: suppliers.len(),
        ..Default::default()
    };

    for supplier in &suppliers {
        report.matched += 1;
        let days_remaining = supplier.contract_days_remaining(now);
        let recipients = recipients_for(ctx.gateway.as_ref(), supplier, true, true)?;
        for user_id in recipients {
            let request = NotificationRequest {
                user_id,
                notification_type: NotificationType::RiskAlert,
                title: format!("Critical: {} needs immediate attention", supplier.name),
                message: format!(
                    "Supplier {} is rated {} and its contract ends within {} days.",
                    supplier.name,
                    supplier.risk_level.as_str(),
                    COMPOUND_WINDOW_DAYS
                ),
                metadata: json!({
                    "supplierId": supplier.id,
                    "riskLevel": supplier.risk_level.as_str(),
                    "daysRemaining": days_remaining,
                    "compound": true,
                }),
                priority: NotificationPriority::High,
            };
            deliver(ctx, &mut report, request, now, true).await;
        }
    }

    info!(
        scanned = report.scanned,
        notified = report.notified,
        "Critical compound scan finished"
    );
    Ok(report)
}
