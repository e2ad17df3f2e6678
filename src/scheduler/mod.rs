//! Recurring schedule and manual trigger surface.
//!
//! The scheduler owns the durable recurring definitions: it wakes when the
//! earliest is due, enqueues the scan and advances the definition to its
//! next cron occurrence in its timezone. The same loop keeps the queues
//! healthy (promotion, stale recovery, retention). Its handle is the
//! outside surface for manual triggers and job/queue inspection.

mod handle;
mod recurring;
mod scheduler;

pub use handle::{
    JobDetailView, MonitorCommand, MonitorHandle, QueueStatsView, TriggerError, TriggeredJob,
};
pub use recurring::{default_definitions, next_occurrence, RecurringJobDef};
pub use scheduler::{create_scheduler, MonitorScheduler};
