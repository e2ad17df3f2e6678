//! Notification and preference storage.

use super::models::{Notification, NotificationPriority, NotificationType};
use super::preferences::NotificationPreferences;
use super::schema::NOTIFICATIONS_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Hard cap on stored notifications per user; the oldest are dropped past it.
const MAX_NOTIFICATIONS_PER_USER: usize = 100;

/// Trait for notification storage operations.
pub trait NotificationStore: Send + Sync {
    /// Persist a notification.
    /// Enforces the per-user limit by deleting the oldest records if needed.
    fn create_notification(&self, notification: Notification) -> Result<Notification>;

    /// Get notifications for a user, newest first, excluding deleted ones.
    fn get_user_notifications(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Notification>>;

    /// Get a single notification by ID (verifies ownership).
    fn get_notification(
        &self,
        notification_id: &str,
        user_id: &str,
    ) -> Result<Option<Notification>>;

    /// Mark a notification as read. Returns the updated notification.
    /// Returns Ok(None) if it doesn't exist or doesn't belong to the user.
    fn mark_notification_read(
        &self,
        notification_id: &str,
        user_id: &str,
    ) -> Result<Option<Notification>>;

    /// Count of unread notifications for a user.
    fn get_unread_count(&self, user_id: &str) -> Result<usize>;

    /// Whether a record for (user, type, entity) exists at or after
    /// `window_start` (unix seconds). The dedup guard's probe.
    fn has_notification_since(
        &self,
        user_id: &str,
        notification_type: NotificationType,
        entity_id: &str,
        window_start: i64,
    ) -> Result<bool>;
}

/// Trait for notification preference storage operations.
pub trait PreferenceStore: Send + Sync {
    /// Returns the user's preferences.
    /// Returns Ok(None) if no record exists yet.
    fn get_preferences(&self, user_id: &str) -> Result<Option<NotificationPreferences>>;

    /// Returns the user's preferences, creating a default record first if
    /// none exists.
    fn ensure_preferences(&self, user_id: &str) -> Result<NotificationPreferences>;

    /// Replaces the user's preferences.
    fn update_preferences(&self, user_id: &str, prefs: &NotificationPreferences) -> Result<()>;
}

pub struct SqliteNotificationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNotificationStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, NOTIFICATIONS_VERSIONED_SCHEMAS, "notifications")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        NOTIFICATIONS_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
        let metadata_str: String = row.get("metadata")?;
        Ok(Notification {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            notification_type: NotificationType::from_str(
                &row.get::<_, String>("notification_type")?,
            )
            .unwrap_or(NotificationType::SystemAlert),
            title: row.get("title")?,
            message: row.get("message")?,
            metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null),
            priority: NotificationPriority::from_str(&row.get::<_, String>("priority")?)
                .unwrap_or(NotificationPriority::Low),
            is_read: row.get("is_read")?,
            is_deleted: row.get("is_deleted")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_preferences(row: &rusqlite::Row) -> rusqlite::Result<NotificationPreferences> {
        let hour = |value: Option<i64>| value.and_then(|h| u8::try_from(h).ok());
        Ok(NotificationPreferences {
            risk_alerts: row.get("risk_alerts")?,
            contract_alerts: row.get("contract_alerts")?,
            assessment_alerts: row.get("assessment_alerts")?,
            problem_alerts: row.get("problem_alerts")?,
            report_notifications: row.get("report_notifications")?,
            payment_alerts: row.get("payment_alerts")?,
            system_alerts: row.get("system_alerts")?,
            email_enabled: row.get("email_enabled")?,
            quiet_hours_start: hour(row.get("quiet_hours_start")?),
            quiet_hours_end: hour(row.get("quiet_hours_end")?),
        })
    }
}

impl NotificationStore for SqliteNotificationStore {
    fn create_notification(&self, notification: Notification) -> Result<Notification> {
        let metadata_str = serde_json::to_string(&notification.metadata)
            .context("Failed to serialize notification metadata")?;
        let entity_id = notification.entity_id().map(|s| s.to_string());

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO notifications (
                id, user_id, notification_type, title, message, metadata,
                entity_id, priority, is_read, is_deleted, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                notification.id,
                notification.user_id,
                notification.notification_type.as_str(),
                notification.title,
                notification.message,
                metadata_str,
                entity_id,
                notification.priority.as_str(),
                notification.is_read,
                notification.is_deleted,
                notification.created_at,
            ],
        )?;

        // Drop the oldest records past the per-user cap
        conn.execute(
            "DELETE FROM notifications
             WHERE user_id = ?1 AND id NOT IN (
                SELECT id FROM notifications
                WHERE user_id = ?1
                ORDER BY created_at DESC, id DESC
                LIMIT ?2
             )",
            params![notification.user_id, MAX_NOTIFICATIONS_PER_USER as i64],
        )?;

        Ok(notification)
    }

    fn get_user_notifications(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM notifications
             WHERE user_id = ?1 AND is_deleted = 0
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let notifications = stmt
            .query_map(
                params![user_id, limit as i64, offset as i64],
                Self::row_to_notification,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notifications)
    }

    fn get_notification(
        &self,
        notification_id: &str,
        user_id: &str,
    ) -> Result<Option<Notification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM notifications WHERE id = ?1 AND user_id = ?2")?;
        let notification = stmt
            .query_row(params![notification_id, user_id], Self::row_to_notification)
            .optional()?;
        Ok(notification)
    }

    fn mark_notification_read(
        &self,
        notification_id: &str,
        user_id: &str,
    ) -> Result<Option<Notification>> {
        {
            let conn = self.conn.lock().unwrap();
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                params![notification_id, user_id],
            )?;
            if updated == 0 {
                return Ok(None);
            }
        }
        self.get_notification(notification_id, user_id)
    }

    fn get_unread_count(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications
             WHERE user_id = ?1 AND is_read = 0 AND is_deleted = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn has_notification_since(
        &self,
        user_id: &str,
        notification_type: NotificationType,
        entity_id: &str,
        window_start: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i32> = conn
            .query_row(
                "SELECT 1 FROM notifications
                 WHERE user_id = ?1 AND notification_type = ?2
                   AND entity_id = ?3 AND created_at >= ?4
                 LIMIT 1",
                params![user_id, notification_type.as_str(), entity_id, window_start],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl PreferenceStore for SqliteNotificationStore {
    fn get_preferences(&self, user_id: &str) -> Result<Option<NotificationPreferences>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM notification_preferences WHERE user_id = ?1")?;
        let prefs = stmt
            .query_row(params![user_id], Self::row_to_preferences)
            .optional()?;
        Ok(prefs)
    }

    fn ensure_preferences(&self, user_id: &str) -> Result<NotificationPreferences> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT OR IGNORE INTO notification_preferences (user_id) VALUES (?1)",
                params![user_id],
            )?;
        }
        self.get_preferences(user_id)?
            .with_context(|| format!("Preference record missing for user {}", user_id))
    }

    fn update_preferences(&self, user_id: &str, prefs: &NotificationPreferences) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO notification_preferences (
                user_id, risk_alerts, contract_alerts, assessment_alerts,
                problem_alerts, report_notifications, payment_alerts,
                system_alerts, email_enabled, quiet_hours_start, quiet_hours_end
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(user_id) DO UPDATE SET
                risk_alerts = excluded.risk_alerts,
                contract_alerts = excluded.contract_alerts,
                assessment_alerts = excluded.assessment_alerts,
                problem_alerts = excluded.problem_alerts,
                report_notifications = excluded.report_notifications,
                payment_alerts = excluded.payment_alerts,
                system_alerts = excluded.system_alerts,
                email_enabled = excluded.email_enabled,
                quiet_hours_start = excluded.quiet_hours_start,
                quiet_hours_end = excluded.quiet_hours_end",
            params![
                user_id,
                prefs.risk_alerts,
                prefs.contract_alerts,
                prefs.assessment_alerts,
                prefs.problem_alerts,
                prefs.report_notifications,
                prefs.payment_alerts,
                prefs.system_alerts,
                prefs.email_enabled,
                prefs.quiet_hours_start.map(|h| h as i64),
                prefs.quiet_hours_end.map(|h| h as i64),
            ],
        )?;
        Ok(())
    }
}
