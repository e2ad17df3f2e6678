//! Contract expiry scan: contracts ending soon notify, already-expired
//! contracts are only counted.

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::info;

use crate::notifications::{NotificationPriority, NotificationRequest, NotificationType};
use crate::suppliers::SupplierGateway;

use super::{deliver, recipients_for, ScanContext, ScanError, ScanReport};

const EXPIRY_WINDOW_DAYS: i64 = 30;

/// Priority banding by how soon the contract ends.
pub(crate) fn priority_for_days(days_remaining: i64) -> NotificationPriority {
    if days_remaining <= 7 {
        NotificationPriority::High
    } else if days_remaining <= 15 {
        NotificationPriority::Medium
    } else {
        NotificationPriority::Low
    }
}

/// Notifies the vendor owner and the supplier's own user for contracts
/// ending within the next thirty days.
pub async fn run(ctx: &ScanContext) -> Result<ScanReport, ScanError> {
    let now = Utc::now();
    let until = now + Duration::days(EXPIRY_WINDOW_DAYS);
    let expiring = ctx.gateway.suppliers_with_contract_ending(
        now.timestamp(),
        until.timestamp(),
        ctx.batch_size,
    )?;
    let expired = ctx
        .gateway
        .suppliers_with_expired_contract(now.timestamp(), ctx.batch_size)?;

    let mut report = ScanReport {
        scanned: expiring.len(),
        expired_detected: expired.len(),
        ..Default::default()
    };
    if !expired.is_empty() {
        info!(
            count = expired.len(),
            "Suppliers with already-expired contracts detected"
        );
    }

    for supplier in &expiring {
        let Some(days_remaining) = supplier.contract_days_remaining(now) else {
            continue;
        };
        report.matched += 1;
        let priority = priority_for_days(days_remaining);
        let message = match days_remaining {
            0 => format!("The contract with {} ends today.", supplier.name),
            1 => format!("The contract with {} ends tomorrow.", supplier.name),
            n => format!("The contract with {} ends in {} days.", supplier.name, n),
        };

        let recipients = recipients_for(ctx.gateway.as_ref(), supplier, true, true)?;
        for user_id in recipients {
            let request = NotificationRequest {
                user_id,
                notification_type: NotificationType::ContractExpiry,
                title: format!("Contract expiring: {}", supplier.name),
                message: message.clone(),
                metadata: json!({
                    "supplierId": supplier.id,
                    "daysRemaining": days_remaining,
                    "contractEndDate": supplier.contract_end_date,
                }),
                priority,
            };
            deliver(ctx, &mut report, request, now, false).await;
        }
    }

    info!(
        scanned = report.scanned,
        notified = report.notified,
        expired = report.expired_detected,
        "Contract expiry scan finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationStore;
    use crate::rules::testutil::{fixture, seed_user, seed_vendor_and_owner};
    use crate::suppliers::{RiskLevel, Supplier};

    fn supplier_ending_in(id: &str, user_id: &str, days: i64) -> Supplier {
        Supplier::new(
            id.to_string(),
            format!("Supplier {}", id),
            "v1".to_string(),
            RiskLevel::Low,
        )
        .with_user(user_id.to_string())
        .with_contract_end((Utc::now() + Duration::days(days)).timestamp())
    }

    #[test]
    fn test_priority_banding() {
        assert_eq!(priority_for_days(0), NotificationPriority::High);
        assert_eq!(priority_for_days(7), NotificationPriority::High);
        assert_eq!(priority_for_days(8), NotificationPriority::Medium);
        assert_eq!(priority_for_days(15), NotificationPriority::Medium);
        assert_eq!(priority_for_days(16), NotificationPriority::Low);
        assert_eq!(priority_for_days(30), NotificationPriority::Low);
    }

    #[tokio::test]
    async fn test_banded_priorities_end_to_end() {
        let f = fixture();
        seed_vendor_and_owner(&f.gateway, "v1", "owner");
        for (id, user, days) in [("s5", "u5", 5), ("s10", "u10", 10), ("s20", "u20", 20)] {
            seed_user(&f.gateway, user);
            f.gateway
                .upsert_supplier(&supplier_ending_in(id, user, days))
                .unwrap();
        }

        let report = run(&f.ctx).await.unwrap();
        assert_eq!(report.scanned, 3);
        // Owner plus one own user per supplier
        assert_eq!(report.notified, 6);

        let expectations = [
            ("u5", NotificationPriority::High, 5),
            ("u10", NotificationPriority::Medium, 10),
            ("u20", NotificationPriority::Low, 20),
        ];
        for (user, priority, days) in expectations {
            let records = f.store.get_user_notifications(user, 10, 0).unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(
                records[0].notification_type,
                NotificationType::ContractExpiry
            );
            assert_eq!(records[0].priority, priority);
            assert_eq!(records[0].metadata["daysRemaining"], days);
        }
        assert_eq!(
            f.store.get_user_notifications("owner", 10, 0).unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_expired_contract_detected_but_not_notified() {
        let f = fixture();
        seed_vendor_and_owner(&f.gateway, "v1", "owner");
        seed_user(&f.gateway, "u1");
        f.gateway
            .upsert_supplier(&supplier_ending_in("s1", "u1", -1))
            .unwrap();

        let report = run(&f.ctx).await.unwrap();
        assert_eq!(report.expired_detected, 1);
        assert_eq!(report.scanned, 0);
        assert_eq!(report.notified, 0);
        assert!(f
            .store
            .get_user_notifications("u1", 10, 0)
            .unwrap()
            .is_empty());
        assert!(f
            .store
            .get_user_notifications("owner", 10, 0)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_contract_beyond_window_ignored() {
        let f = fixture();
        seed_vendor_and_owner(&f.gateway, "v1", "owner");
        seed_user(&f.gateway, "u1");
        f.gateway
            .upsert_supplier(&supplier_ending_in("s1", "u1", 31))
            .unwrap();

        let report = run(&f.ctx).await.unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(report.notified, 0);
    }

    #[tokio::test]
    async fn test_rerun_within_window_is_deduplicated() {
        let f = fixture();
        seed_vendor_and_owner(&f.gateway, "v1", "owner");
        seed_user(&f.gateway, "u1");
        f.gateway
            .upsert_supplier(&supplier_ending_in("s1", "u1", 5))
            .unwrap();

        let first = run(&f.ctx).await.unwrap();
        assert_eq!(first.notified, 2);

        let second = run(&f.ctx).await.unwrap();
        assert_eq!(second.notified, 0);
        assert_eq!(second.deduplicated, 2);
    }
}
