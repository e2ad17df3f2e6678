//! Per-user notification preferences.

use serde::{Deserialize, Serialize};

/// Preference category gating a group of notification types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceCategory {
    Risk,
    Contract,
    Assessment,
    Problem,
    Report,
    Payment,
    System,
}

/// A user's notification settings. Lazily created with everything enabled
/// the first time a notification is attempted for the user, so a missing
/// record never suppresses delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub risk_alerts: bool,
    pub contract_alerts: bool,
    pub assessment_alerts: bool,
    pub problem_alerts: bool,
    pub report_notifications: bool,
    pub payment_alerts: bool,
    pub system_alerts: bool,
    /// Global toggle for the email leg. Does not affect DB persistence.
    pub email_enabled: bool,
    /// Hour of day (0-23) when email quiet hours begin, inclusive.
    pub quiet_hours_start: Option<u8>,
    /// Hour of day (0-23) when email quiet hours end, exclusive.
    pub quiet_hours_end: Option<u8>,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            risk_alerts: true,
            contract_alerts: true,
            assessment_alerts: true,
            problem_alerts: true,
            report_notifications: true,
            payment_alerts: true,
            system_alerts: true,
            email_enabled: true,
            quiet_hours_start: None,
            quiet_hours_end: None,
        }
    }
}

impl NotificationPreferences {
    pub fn enabled_for(&self, category: PreferenceCategory) -> bool {
        match category {
            PreferenceCategory::Risk => self.risk_alerts,
            PreferenceCategory::Contract => self.contract_alerts,
            PreferenceCategory::Assessment => self.assessment_alerts,
            PreferenceCategory::Problem => self.problem_alerts,
            PreferenceCategory::Report => self.report_notifications,
            PreferenceCategory::Payment => self.payment_alerts,
            PreferenceCategory::System => self.system_alerts,
        }
    }

    /// Whether `hour` falls inside the configured quiet range [start, end).
    /// Ranges crossing midnight (e.g. 22 to 6) are handled; an unset or
    /// empty range never matches.
    pub fn in_quiet_hours(&self, hour: u8) -> bool {
        let (start, end) = match (self.quiet_hours_start, self.quiet_hours_end) {
            (Some(start), Some(end)) => (start, end),
            _ => return false,
        };
        if start == end {
            return false;
        }
        if start < end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}
