//! User notifications module

mod dedup;
mod email;
mod models;
mod preferences;
mod router;
mod schema;
mod store;

pub use dedup::{dedup_window_start, start_of_utc_day, DedupGuard};
pub use email::{EmailTransport, SmtpEmailTransport};
pub use models::{
    Notification, NotificationPriority, NotificationRequest, NotificationType,
};
pub use preferences::{NotificationPreferences, PreferenceCategory};
pub use router::{NotificationRouter, NotifyError};
pub use store::{NotificationStore, PreferenceStore, SqliteNotificationStore};
