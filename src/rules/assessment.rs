//! Assessment scans: suppliers with incomplete submissions and suppliers
//! never assessed at all.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::notifications::{NotificationPriority, NotificationRequest, NotificationType};
use crate::suppliers::SupplierGateway;

use super::{deliver, recipients_for, ScanContext, ScanError, ScanReport};

/// Reminds each supplier's own user about DRAFT or PENDING submissions.
pub async fn run_incomplete(ctx: &ScanContext) -> Result<ScanReport, ScanError> {
    let now = Utc::now();
    let pending = ctx
        .gateway
        .suppliers_with_pending_assessments(ctx.batch_size)?;

    let mut report = ScanReport {
        scanned: pending.len(),
        ..Default::default()
    };

    for (supplier, pending_count) in &pending {
        report.matched += 1;
        // The supplier's own user is the one who can finish the submission
        let recipients = recipients_for(ctx.gateway.as_ref(), supplier, false, true)?;
        for user_id in recipients {
            let request = NotificationRequest {
                user_id,
                notification_type: NotificationType::AssessmentReminder,
                title: format!("Assessment incomplete: {}", supplier.name),
                message: format!(
                    "{} has {} assessment submission(s) awaiting completion.",
                    supplier.name, pending_count
                ),
                metadata: json!({
                    "supplierId": supplier.id,
                    "pendingCount": pending_count,
                }),
                priority: NotificationPriority::Medium,
            };
            deliver(ctx, &mut report, request, now, false).await;
        }
    }

    info!(
        scanned = report.scanned,
        notified = report.notified,
        "Incomplete assessment scan finished"
    );
    Ok(report)
}

/// Tells the vendor owner about suppliers with no assessment on file.
pub async fn run_missing(ctx: &ScanContext) -> Result<ScanReport, ScanError> {
    let now = Utc::now();
    let missing = ctx.gateway.suppliers_never_assessed(ctx.batch_size)?;

    let mut report = ScanReport {
        scanned: missing.len(),
        ..Default::default()
    };

    for supplier in &missing {
        report.matched += 1;
        // Chasing a first assessment is on the vendor owner, not the supplier
        let recipients = recipients_for(ctx.gateway.as_ref(), supplier, true, false)?;
        for user_id in recipients {
            let request = NotificationRequest {
                user_id,
                notification_type: NotificationType::AssessmentMissing,
                title: format!("No assessment on file: {}", supplier.name),
                message: format!("{} has never submitted a risk assessment.", supplier.name),
                metadata: json!({
                    "supplierId": supplier.id,
                }),
                priority: NotificationPriority::Medium,
            };
            deliver(ctx, &mut report, request, now, false).await;
        }
    }

    info!(
        scanned = report.scanned,
        notified = report.notified,
        "Missing assessment scan finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationStore;
    use crate::rules::testutil::{fixture, seed_user, seed_vendor_and_owner};
    use crate::suppliers::{AssessmentStatus, RiskLevel, Supplier};

    fn supplier(id: &str, user_id: Option<&str>) -> Supplier {
        let s = Supplier::new(
            id.to_string(),
            format!("Supplier {}", id),
            "v1".to_string(),
            RiskLevel::Low,
        );
        match user_id {
            Some(user_id) => s.with_user(user_id.to_string()),
            None => s,
        }
    }

    #[tokio::test]
    async fn test_incomplete_notifies_own_user_only() {
        let f = fixture();
        seed_vendor_and_owner(&f.gateway, "v1", "owner");
        seed_user(&f.gateway, "u1");
        f.gateway.upsert_supplier(&supplier("s1", Some("u1"))).unwrap();
        f.gateway
            .add_assessment_submission("s1", AssessmentStatus::Draft)
            .unwrap();
        f.gateway
            .add_assessment_submission("s1", AssessmentStatus::Pending)
            .unwrap();

        let report = run_incomplete(&f.ctx).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.notified, 1);

        let records = f.store.get_user_notifications("u1", 10, 0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].notification_type,
            NotificationType::AssessmentReminder
        );
        assert_eq!(records[0].priority, NotificationPriority::Medium);
        assert_eq!(records[0].metadata["pendingCount"], 2);

        assert!(f
            .store
            .get_user_notifications("owner", 10, 0)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_without_own_user_notifies_nobody() {
        let f = fixture();
        seed_vendor_and_owner(&f.gateway, "v1", "owner");
        f.gateway.upsert_supplier(&supplier("s1", None)).unwrap();
        f.gateway
            .add_assessment_submission("s1", AssessmentStatus::Draft)
            .unwrap();

        let report = run_incomplete(&f.ctx).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.notified, 0);
        assert_eq!(report.skipped_errors, 0);
    }

    #[tokio::test]
    async fn test_missing_notifies_owner_only() {
        let f = fixture();
        seed_vendor_and_owner(&f.gateway, "v1", "owner");
        seed_user(&f.gateway, "u1");
        f.gateway.upsert_supplier(&supplier("s1", Some("u1"))).unwrap();

        let report = run_missing(&f.ctx).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.notified, 1);

        let records = f.store.get_user_notifications("owner", 10, 0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].notification_type,
            NotificationType::AssessmentMissing
        );
        assert!(f
            .store
            .get_user_notifications("u1", 10, 0)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_completed_assessment_selected_by_neither_scan() {
        let f = fixture();
        seed_vendor_and_owner(&f.gateway, "v1", "owner");
        seed_user(&f.gateway, "u1");
        f.gateway.upsert_supplier(&supplier("s1", Some("u1"))).unwrap();
        f.gateway
            .add_assessment_submission("s1", AssessmentStatus::Approved)
            .unwrap();

        let incomplete = run_incomplete(&f.ctx).await.unwrap();
        assert_eq!(incomplete.scanned, 0);

        let missing = run_missing(&f.ctx).await.unwrap();
        assert_eq!(missing.scanned, 0);
    }

    #[tokio::test]
    async fn test_incomplete_rerun_is_deduplicated() {
        let f = fixture();
        seed_vendor_and_owner(&f.gateway, "v1", "owner");
        seed_user(&f.gateway, "u1");
        f.gateway.upsert_supplier(&supplier("s1", Some("u1"))).unwrap();
        f.gateway
            .add_assessment_submission("s1", AssessmentStatus::Pending)
            .unwrap();

        let first = run_incomplete(&f.ctx).await.unwrap();
        assert_eq!(first.notified, 1);

        let second = run_incomplete(&f.ctx).await.unwrap();
        assert_eq!(second.notified, 0);
        assert_eq!(second.deduplicated, 1);
    }
}
