//! Duplicate suppression for scan-produced notifications.
//!
//! Each notification type carries a lookback window; a candidate is dropped
//! when a record for the same (user, type, entity) already exists inside the
//! window. Types without a window are never suppressed.

use super::models::NotificationType;
use super::store::NotificationStore;
use anyhow::Result;
use chrono::{DateTime, NaiveTime, Utc};
use std::sync::Arc;

const SECONDS_PER_DAY: i64 = 86_400;

const CONTRACT_LOOKBACK_DAYS: i64 = 3;
const ASSESSMENT_LOOKBACK_DAYS: i64 = 2;
const MISSING_ASSESSMENT_LOOKBACK_DAYS: i64 = 7;

/// Unix timestamp of 00:00:00 UTC on the day containing `now`.
pub fn start_of_utc_day(now: DateTime<Utc>) -> i64 {
    now.date_naive().and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Start of the dedup window for a notification type, or None when the type
/// is not deduplicated.
///
/// Risk alerts are suppressed for the rest of the calendar day (UTC) rather
/// than a rolling 24 hours, so a supplier flagged at 23:50 can be flagged
/// again the next morning.
pub fn dedup_window_start(
    notification_type: NotificationType,
    now: DateTime<Utc>,
) -> Option<i64> {
    match notification_type {
        NotificationType::RiskAlert => Some(start_of_utc_day(now)),
        NotificationType::ContractExpiry => {
            Some(now.timestamp() - CONTRACT_LOOKBACK_DAYS * SECONDS_PER_DAY)
        }
        NotificationType::AssessmentReminder => {
            Some(now.timestamp() - ASSESSMENT_LOOKBACK_DAYS * SECONDS_PER_DAY)
        }
        NotificationType::AssessmentMissing => {
            Some(now.timestamp() - MISSING_ASSESSMENT_LOOKBACK_DAYS * SECONDS_PER_DAY)
        }
        NotificationType::WeeklyReport
        | NotificationType::ProblemReport
        | NotificationType::PaymentDue
        | NotificationType::SystemAlert => None,
    }
}

/// Checks candidate notifications against the store before they are routed.
#[derive(Clone)]
pub struct DedupGuard {
    store: Arc<dyn NotificationStore>,
}

impl DedupGuard {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Whether a notification of this type for this entity should go out now.
    /// Returns Ok(true) when the type has no dedup window.
    pub fn should_notify(
        &self,
        user_id: &str,
        notification_type: NotificationType,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(window_start) = dedup_window_start(notification_type, now) else {
            return Ok(true);
        };
        let already_sent =
            self.store
                .has_notification_since(user_id, notification_type, entity_id, window_start)?;
        Ok(!already_sent)
    }
}
