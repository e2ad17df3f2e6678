//! Durable job queue.
//!
//! Jobs live in SQLite so a restart loses nothing: waiting jobs stay
//! claimable, delayed jobs keep their run-at time and jobs caught mid-flight
//! are recovered by the scheduler's housekeeping. Workers claim per queue,
//! dispatch to the rule evaluators and settle each attempt through the retry
//! policy under a shared rate cap.

mod dispatcher;
mod models;
mod retry_policy;
mod schema;
mod store;
mod throttle;
mod worker;

pub use dispatcher::JobDispatcher;
pub use models::*;
pub use retry_policy::RetryPolicy;
pub use schema::JOBS_VERSIONED_SCHEMAS;
pub use store::{JobQueueStore, SqliteJobQueueStore, StoredRecurringJob};
pub use throttle::{DispatchThrottler, NoOpThrottler, SlidingWindowThrottler};
pub use worker::{QueueWorker, WorkerPool};
