//! Durable job queue storage.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::models::{JobKind, JobPayload, JobPriority, JobState, QueueCounts, QueuedJob, QueueName};
use super::schema::JOBS_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned;

/// A durable recurring job definition, one row per kind.
#[derive(Debug, Clone)]
pub struct StoredRecurringJob {
    pub kind: String,
    pub queue: String,
    pub cron: String,
    pub timezone: String,
    pub priority: i64,
    pub next_run_at: i64,
    pub last_run_at: Option<i64>,
}

/// Trait for job queue storage operations.
///
/// Time-dependent housekeeping operations take `now` explicitly so callers
/// (and tests) control the clock.
pub trait JobQueueStore: Send + Sync {
    /// Enqueue a job in the waiting state, claimable immediately.
    fn enqueue(
        &self,
        kind: JobKind,
        priority: JobPriority,
        max_attempts: u32,
        manual: bool,
    ) -> Result<QueuedJob>;

    /// Enqueue a job in the delayed state, claimable once promoted after
    /// `run_at` (unix seconds).
    fn enqueue_delayed(
        &self,
        kind: JobKind,
        priority: JobPriority,
        max_attempts: u32,
        run_at: i64,
    ) -> Result<QueuedJob>;

    /// Get a job by ID.
    /// Returns Ok(None) if the job does not exist.
    fn get_job(&self, job_id: &str) -> Result<Option<QueuedJob>>;

    /// Claim the next waiting job on a queue, by priority then age.
    /// The claimed job moves to active with its attempt counted.
    /// Returns Ok(None) if the queue has no waiting jobs.
    fn claim_next(&self, queue: QueueName) -> Result<Option<QueuedJob>>;

    /// Record a successful run. The job moves to completed.
    fn mark_completed(&self, job_id: &str, return_value: &str) -> Result<()>;

    /// Record a final failure. The job moves to failed.
    fn mark_failed(&self, job_id: &str, reason: &str) -> Result<()>;

    /// Record a retryable failure. The job moves to delayed until `run_at`.
    fn mark_retrying(&self, job_id: &str, run_at: i64, reason: &str) -> Result<()>;

    /// Move delayed jobs whose run-at has passed back to waiting.
    /// Returns the number of promoted jobs.
    fn promote_due(&self, now: i64) -> Result<usize>;

    /// Requeue active jobs older than the stale threshold; jobs with no
    /// attempts left are failed instead. Returns the number of touched jobs.
    fn recover_stale(&self, now: i64, stale_threshold_secs: i64) -> Result<usize>;

    /// Job counts for one queue broken down by state.
    fn counts_by_state(&self, queue: QueueName) -> Result<QueueCounts>;

    /// Delete terminal jobs that finished before `cutoff`.
    /// Returns the number of deleted jobs.
    fn prune_finished(&self, cutoff: i64) -> Result<usize>;

    /// Atomically replace the recurring definitions owned by these queues.
    fn replace_recurring(&self, queues: &[QueueName], defs: &[StoredRecurringJob]) -> Result<()>;

    /// All recurring definitions, ordered by next run time.
    fn list_recurring(&self) -> Result<Vec<StoredRecurringJob>>;

    /// Record a recurring fire and its next occurrence.
    fn mark_recurring_run(&self, kind: &str, last_run_at: i64, next_run_at: i64) -> Result<()>;
}

pub struct SqliteJobQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobQueueStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, JOBS_VERSIONED_SCHEMAS, "jobs")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        JOBS_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<QueuedJob> {
        Ok(QueuedJob {
            id: row.get("id")?,
            kind: row.get("kind")?,
            queue: row.get("queue")?,
            payload: row.get("payload")?,
            priority: row.get("priority")?,
            state: JobState::from_str(&row.get::<_, String>("state")?)
                .unwrap_or(JobState::Failed),
            attempts_made: row.get("attempts_made")?,
            max_attempts: row.get("max_attempts")?,
            failed_reason: row.get("failed_reason")?,
            return_value: row.get("return_value")?,
            run_at: row.get("run_at")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
        })
    }

    fn row_to_recurring(row: &rusqlite::Row) -> rusqlite::Result<StoredRecurringJob> {
        Ok(StoredRecurringJob {
            kind: row.get("kind")?,
            queue: row.get("queue")?,
            cron: row.get("cron")?,
            timezone: row.get("timezone")?,
            priority: row.get("priority")?,
            next_run_at: row.get("next_run_at")?,
            last_run_at: row.get("last_run_at")?,
        })
    }

    fn insert_job(
        &self,
        kind: JobKind,
        priority: JobPriority,
        max_attempts: u32,
        state: JobState,
        run_at: i64,
        manual: bool,
    ) -> Result<QueuedJob> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&JobPayload::new(kind, priority, manual))
            .context("Failed to serialize job payload")?;
        let now = Self::now();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs (
                id, kind, queue, payload, priority, state, attempts_made,
                max_attempts, run_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9)",
            params![
                id,
                kind.as_str(),
                kind.queue().as_str(),
                payload,
                priority.ordinal(),
                state.as_str(),
                max_attempts,
                run_at,
                now,
            ],
        )?;

        Ok(QueuedJob {
            id,
            kind: kind.as_str().to_string(),
            queue: kind.queue().as_str().to_string(),
            payload,
            priority: priority.ordinal(),
            state,
            attempts_made: 0,
            max_attempts,
            failed_reason: None,
            return_value: None,
            run_at,
            created_at: now,
            started_at: None,
            finished_at: None,
        })
    }
}

impl JobQueueStore for SqliteJobQueueStore {
    fn enqueue(
        &self,
        kind: JobKind,
        priority: JobPriority,
        max_attempts: u32,
        manual: bool,
    ) -> Result<QueuedJob> {
        self.insert_job(kind, priority, max_attempts, JobState::Waiting, Self::now(), manual)
    }

    fn enqueue_delayed(
        &self,
        kind: JobKind,
        priority: JobPriority,
        max_attempts: u32,
        run_at: i64,
    ) -> Result<QueuedJob> {
        self.insert_job(kind, priority, max_attempts, JobState::Delayed, run_at, false)
    }

    fn get_job(&self, job_id: &str) -> Result<Option<QueuedJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let job = stmt
            .query_row(params![job_id], Self::row_to_job)
            .optional()?;
        Ok(job)
    }

    fn claim_next(&self, queue: QueueName) -> Result<Option<QueuedJob>> {
        let now = Self::now();
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT * FROM jobs
             WHERE queue = ?1 AND state = 'waiting'
             ORDER BY priority ASC, created_at ASC, id ASC
             LIMIT 1",
        )?;
        let candidate = stmt
            .query_row(params![queue.as_str()], Self::row_to_job)
            .optional()?;
        let Some(mut job) = candidate else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE jobs
             SET state = 'active', attempts_made = attempts_made + 1, started_at = ?2
             WHERE id = ?1",
            params![job.id, now],
        )?;

        job.state = JobState::Active;
        job.attempts_made += 1;
        job.started_at = Some(now);
        Ok(Some(job))
    }

    fn mark_completed(&self, job_id: &str, return_value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs
             SET state = 'completed', return_value = ?2, finished_at = ?3
             WHERE id = ?1",
            params![job_id, return_value, Self::now()],
        )?;
        Ok(())
    }

    fn mark_failed(&self, job_id: &str, reason: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs
             SET state = 'failed', failed_reason = ?2, finished_at = ?3
             WHERE id = ?1",
            params![job_id, reason, Self::now()],
        )?;
        Ok(())
    }

    fn mark_retrying(&self, job_id: &str, run_at: i64, reason: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs
             SET state = 'delayed', run_at = ?2, failed_reason = ?3
             WHERE id = ?1",
            params![job_id, run_at, reason],
        )?;
        Ok(())
    }

    fn promote_due(&self, now: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let promoted = conn.execute(
            "UPDATE jobs SET state = 'waiting' WHERE state = 'delayed' AND run_at <= ?1",
            params![now],
        )?;
        Ok(promoted)
    }

    fn recover_stale(&self, now: i64, stale_threshold_secs: i64) -> Result<usize> {
        let cutoff = now - stale_threshold_secs;
        let conn = self.conn.lock().unwrap();

        let failed = conn.execute(
            "UPDATE jobs
             SET state = 'failed', failed_reason = 'stalled: worker did not finish',
                 finished_at = ?2
             WHERE state = 'active' AND started_at <= ?1
               AND attempts_made >= max_attempts",
            params![cutoff, now],
        )?;
        let requeued = conn.execute(
            "UPDATE jobs
             SET state = 'waiting', run_at = ?2
             WHERE state = 'active' AND started_at <= ?1",
            params![cutoff, now],
        )?;
        Ok(failed + requeued)
    }

    fn counts_by_state(&self, queue: QueueName) -> Result<QueueCounts> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT state, COUNT(*) FROM jobs WHERE queue = ?1 GROUP BY state",
        )?;
        let rows = stmt.query_map(params![queue.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let (state, count) = row?;
            let count = count as usize;
            match JobState::from_str(&state) {
                Some(JobState::Waiting) => counts.waiting = count,
                Some(JobState::Active) => counts.active = count,
                Some(JobState::Completed) => counts.completed = count,
                Some(JobState::Failed) => counts.failed = count,
                Some(JobState::Delayed) => counts.delayed = count,
                None => {}
            }
        }
        Ok(counts)
    }

    fn prune_finished(&self, cutoff: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let pruned = conn.execute(
            "DELETE FROM jobs
             WHERE state IN ('completed', 'failed') AND finished_at < ?1",
            params![cutoff],
        )?;
        Ok(pruned)
    }

    fn replace_recurring(&self, queues: &[QueueName], defs: &[StoredRecurringJob]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let placeholders = vec!["?"; queues.len()].join(", ");
        tx.execute(
            &format!("DELETE FROM recurring_jobs WHERE queue IN ({})", placeholders),
            rusqlite::params_from_iter(queues.iter().map(|q| q.as_str())),
        )?;

        for def in defs {
            tx.execute(
                "INSERT INTO recurring_jobs (
                    kind, queue, cron, timezone, priority, next_run_at, last_run_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    def.kind,
                    def.queue,
                    def.cron,
                    def.timezone,
                    def.priority,
                    def.next_run_at,
                    def.last_run_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn list_recurring(&self) -> Result<Vec<StoredRecurringJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM recurring_jobs ORDER BY next_run_at ASC, kind ASC")?;
        let defs = stmt
            .query_map([], Self::row_to_recurring)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(defs)
    }

    fn mark_recurring_run(&self, kind: &str, last_run_at: i64, next_run_at: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE recurring_jobs SET last_run_at = ?2, next_run_at = ?3 WHERE kind = ?1",
            params![kind, last_run_at, next_run_at],
        )?;
        Ok(())
    }
}
