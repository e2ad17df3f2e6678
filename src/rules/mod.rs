//! Rule evaluators that scan the supplier fleet.
//!
//! Each evaluator queries a bounded batch through the gateway, walks the
//! matching suppliers sequentially and hands one notification request per
//! recipient to the router, guarded by the dedup windows. Failures local to
//! one recipient are logged and counted; gateway failures abort the scan so
//! the queue can retry it.

pub mod assessment;
pub mod contract_expiry;
pub mod critical_compound;
pub mod high_risk;
pub mod weekly_report;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::notifications::{DedupGuard, NotificationRequest, NotificationRouter, NotifyError};
use crate::suppliers::{Supplier, SupplierGateway};

/// Everything an evaluator needs for one scan.
pub struct ScanContext {
    pub gateway: Arc<dyn SupplierGateway>,
    pub router: Arc<NotificationRouter>,
    pub guard: DedupGuard,
    /// Upper bound on entities examined per scan.
    pub batch_size: usize,
}

#[derive(Debug, Error)]
pub enum ScanError {
    /// The job carried a kind this build does not know. Never retried.
    #[error("Unknown job kind: {0}")]
    UnknownKind(String),
    /// The fleet database was unreachable or a query failed. Retryable.
    #[error(transparent)]
    Gateway(#[from] anyhow::Error),
}

impl ScanError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScanError::Gateway(_))
    }
}

/// What one evaluator run did, stored as the job's return value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub scanned: usize,
    pub matched: usize,
    pub notified: usize,
    pub deduplicated: usize,
    pub skipped_errors: usize,
    /// Only the contract scan sets this; expired contracts are counted but
    /// never notified.
    pub expired_detected: usize,
}

/// The recipient set for a supplier: the owning vendor's user and/or the
/// supplier's own user, without double counting when they coincide.
pub(crate) fn recipients_for(
    gateway: &dyn SupplierGateway,
    supplier: &Supplier,
    include_owner: bool,
    include_own_user: bool,
) -> anyhow::Result<Vec<String>> {
    let mut recipients = Vec::new();
    if include_owner {
        if let Some(owner) = gateway.get_vendor_owner(&supplier.vendor_id)? {
            recipients.push(owner);
        } else {
            debug!(
                supplier_id = %supplier.id,
                vendor_id = %supplier.vendor_id,
                "Supplier's vendor has no owner on file"
            );
        }
    }
    if include_own_user {
        if let Some(user_id) = &supplier.user_id {
            if !recipients.contains(user_id) {
                recipients.push(user_id.clone());
            }
        }
    }
    Ok(recipients)
}

/// Routes one notification request through the dedup guard, folding the
/// outcome into the report. Per-recipient failures never abort the scan.
pub(crate) async fn deliver(
    ctx: &ScanContext,
    report: &mut ScanReport,
    request: NotificationRequest,
    now: DateTime<Utc>,
    bypass_dedup: bool,
) {
    let entity_id = request
        .metadata
        .get("supplierId")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    if !bypass_dedup {
        match ctx.guard.should_notify(
            &request.user_id,
            request.notification_type,
            &entity_id,
            now,
        ) {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    user_id = %request.user_id,
                    entity_id = %entity_id,
                    notification_type = request.notification_type.as_str(),
                    "Already notified inside the dedup window, skipping"
                );
                report.deduplicated += 1;
                return;
            }
            Err(err) => {
                warn!(
                    user_id = %request.user_id,
                    entity_id = %entity_id,
                    "Dedup lookup failed: {}",
                    err
                );
                report.skipped_errors += 1;
                return;
            }
        }
    }

    match ctx.router.create_notification(request).await {
        Ok(Some(_)) => report.notified += 1,
        // Preference-gated: nothing persisted, nothing to count
        Ok(None) => {}
        Err(NotifyError::UserNotFound(user_id)) => {
            warn!(user_id = %user_id, "Notification target user not found");
            report.skipped_errors += 1;
        }
        Err(NotifyError::Store(err)) => {
            warn!(entity_id = %entity_id, "Failed to store notification: {}", err);
            report.skipped_errors += 1;
        }
    }
}
