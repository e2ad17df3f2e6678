//! Supplier Monitor Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod job_queue;
pub mod notifications;
pub mod rules;
pub mod scheduler;
pub mod sqlite_persistence;
pub mod suppliers;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, MonitorSettings};
pub use notifications::{NotificationRouter, NotificationStore, SqliteNotificationStore};
pub use scheduler::{create_scheduler, MonitorHandle};
pub use suppliers::{SqliteSupplierGateway, SupplierGateway};
