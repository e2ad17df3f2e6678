//! Notification data models.

use super::preferences::PreferenceCategory;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    RiskAlert,
    ContractExpiry,
    AssessmentReminder,
    AssessmentMissing,
    WeeklyReport,
    ProblemReport,
    PaymentDue,
    SystemAlert,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::RiskAlert => "RISK_ALERT",
            NotificationType::ContractExpiry => "CONTRACT_EXPIRY",
            NotificationType::AssessmentReminder => "ASSESSMENT_REMINDER",
            NotificationType::AssessmentMissing => "ASSESSMENT_MISSING",
            NotificationType::WeeklyReport => "WEEKLY_REPORT",
            NotificationType::ProblemReport => "PROBLEM_REPORT",
            NotificationType::PaymentDue => "PAYMENT_DUE",
            NotificationType::SystemAlert => "SYSTEM_ALERT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RISK_ALERT" => Some(NotificationType::RiskAlert),
            "CONTRACT_EXPIRY" => Some(NotificationType::ContractExpiry),
            "ASSESSMENT_REMINDER" => Some(NotificationType::AssessmentReminder),
            "ASSESSMENT_MISSING" => Some(NotificationType::AssessmentMissing),
            "WEEKLY_REPORT" => Some(NotificationType::WeeklyReport),
            "PROBLEM_REPORT" => Some(NotificationType::ProblemReport),
            "PAYMENT_DUE" => Some(NotificationType::PaymentDue),
            "SYSTEM_ALERT" => Some(NotificationType::SystemAlert),
            _ => None,
        }
    }

    /// The preference category whose flag gates this type.
    pub fn category(&self) -> PreferenceCategory {
        match self {
            NotificationType::RiskAlert => PreferenceCategory::Risk,
            NotificationType::ContractExpiry => PreferenceCategory::Contract,
            NotificationType::AssessmentReminder | NotificationType::AssessmentMissing => {
                PreferenceCategory::Assessment
            }
            NotificationType::WeeklyReport => PreferenceCategory::Report,
            NotificationType::ProblemReport => PreferenceCategory::Problem,
            NotificationType::PaymentDue => PreferenceCategory::Payment,
            NotificationType::SystemAlert => PreferenceCategory::System,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "LOW",
            NotificationPriority::Medium => "MEDIUM",
            NotificationPriority::High => "HIGH",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(NotificationPriority::Low),
            "MEDIUM" => Some(NotificationPriority::Medium),
            "HIGH" => Some(NotificationPriority::High),
            _ => None,
        }
    }
}

/// A persisted user notification. Created only by the router; read paths
/// (mark-as-read, listing) live elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    /// Free-form context keyed by domain entity, e.g. {"supplierId": "..."}.
    pub metadata: serde_json::Value,
    pub priority: NotificationPriority,
    pub is_read: bool,
    pub is_deleted: bool,
    pub created_at: i64,
}

impl Notification {
    pub fn new(
        user_id: String,
        notification_type: NotificationType,
        title: String,
        message: String,
        metadata: serde_json::Value,
        priority: NotificationPriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            notification_type,
            title,
            message,
            metadata,
            priority,
            is_read: false,
            is_deleted: false,
            created_at: Utc::now().timestamp(),
        }
    }

    /// The domain entity this notification is about, taken from metadata.
    /// Used as the dedup key alongside user and type.
    pub fn entity_id(&self) -> Option<&str> {
        self.metadata.get("supplierId").and_then(|v| v.as_str())
    }
}

/// A request to create a notification, before routing decides whether it
/// gets persisted and/or emailed.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub user_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub priority: NotificationPriority,
}
