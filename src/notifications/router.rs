//! Preference-aware routing of notification requests.

use std::sync::Arc;

use chrono::{Timelike, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::suppliers::{SupplierGateway, User};

use super::email::EmailTransport;
use super::models::{Notification, NotificationRequest};
use super::preferences::NotificationPreferences;
use super::store::{NotificationStore, PreferenceStore};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("User {0} not found")]
    UserNotFound(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Routes notification requests through the user's preferences: persists a
/// record when the type's category is enabled and sends an email when the
/// user's email toggle allows it.
pub struct NotificationRouter {
    gateway: Arc<dyn SupplierGateway>,
    store: Arc<dyn NotificationStore>,
    preferences: Arc<dyn PreferenceStore>,
    email: Option<Arc<dyn EmailTransport>>,
    quiet_hours_enabled: bool,
}

impl NotificationRouter {
    pub fn new(
        gateway: Arc<dyn SupplierGateway>,
        store: Arc<dyn NotificationStore>,
        preferences: Arc<dyn PreferenceStore>,
        email: Option<Arc<dyn EmailTransport>>,
        quiet_hours_enabled: bool,
    ) -> Self {
        Self {
            gateway,
            store,
            preferences,
            email,
            quiet_hours_enabled,
        }
    }

    /// Create a notification for a user, honoring their preferences.
    ///
    /// Returns Ok(None) when the type's category is disabled for the user;
    /// the email leg is still evaluated on its own in that case. Email
    /// delivery failures are logged and never surface to the caller.
    pub async fn create_notification(
        &self,
        request: NotificationRequest,
    ) -> Result<Option<Notification>, NotifyError> {
        // 1. Resolve the target user before any side effects
        let user = self
            .gateway
            .get_user(&request.user_id)?
            .ok_or_else(|| NotifyError::UserNotFound(request.user_id.clone()))?;

        // 2. Load preferences, creating the default record on first contact
        let prefs = self.preferences.ensure_preferences(&request.user_id)?;

        // 3. Persist, unless the type's category is switched off
        let persisted = if prefs.enabled_for(request.notification_type.category()) {
            let notification = Notification::new(
                request.user_id.clone(),
                request.notification_type,
                request.title.clone(),
                request.message.clone(),
                request.metadata.clone(),
                request.priority,
            );
            Some(self.store.create_notification(notification)?)
        } else {
            debug!(
                user_id = %request.user_id,
                notification_type = request.notification_type.as_str(),
                "Notification category disabled, skipping record"
            );
            None
        };

        // 4. Email leg, independent of the persistence outcome
        self.send_email(&user, &request, &prefs).await;

        Ok(persisted)
    }

    async fn send_email(
        &self,
        user: &User,
        request: &NotificationRequest,
        prefs: &NotificationPreferences,
    ) {
        let Some(transport) = &self.email else {
            return;
        };
        if !prefs.email_enabled {
            return;
        }
        if self.quiet_hours_enabled {
            let hour = Utc::now().hour() as u8;
            if prefs.in_quiet_hours(hour) {
                debug!(user_id = %user.id, hour, "Quiet hours, holding back email");
                return;
            }
        }

        let subject = format!(
            "[supplier-monitor][{}] {}",
            request.priority.as_str(),
            request.title
        );
        let body = Self::format_body(request);

        if let Err(err) = transport.send(&user.email, &subject, &body).await {
            warn!(
                "Failed to send notification email to {}: {}",
                user.email, err
            );
        }
    }

    fn format_body(request: &NotificationRequest) -> String {
        let mut lines = vec![request.message.clone()];
        if let Some(details) = request.metadata.as_object() {
            if !details.is_empty() {
                lines.push(String::new());
                for (key, value) in details {
                    let rendered = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    lines.push(format!("{}: {}", key, rendered));
                }
            }
        }
        lines.join("\n")
    }
}
