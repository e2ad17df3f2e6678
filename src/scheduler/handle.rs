//! Outside surface of the scheduler: manual triggers and inspection.

use std::sync::Arc;

use anyhow::Result;
use chrono::DateTime;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::job_queue::{JobQueueStore, QueueName, QueuedJob};

/// Command sent to the scheduler loop.
pub enum MonitorCommand {
    Trigger {
        key: String,
        response: oneshot::Sender<Result<TriggeredJob, TriggerError>>,
    },
}

#[derive(Debug, Error)]
pub enum TriggerError {
    /// The key does not map to any job kind.
    #[error("Unknown trigger key: {0}")]
    UnknownKey(String),
    #[error("Trigger failed: {0}")]
    Internal(String),
}

/// What a manual trigger returns: enough to poll the job afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredJob {
    pub job_id: String,
    pub kind: String,
    pub status: String,
}

/// A queued job shaped for inspection, timestamps in RFC3339.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetailView {
    pub id: String,
    pub kind: String,
    pub queue: String,
    pub state: String,
    pub priority: i64,
    pub attempts_made: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_value: Option<serde_json::Value>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl From<QueuedJob> for JobDetailView {
    fn from(job: QueuedJob) -> Self {
        let return_value = job
            .return_value
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        JobDetailView {
            id: job.id,
            kind: job.kind,
            queue: job.queue,
            state: job.state.as_str().to_string(),
            priority: job.priority,
            attempts_made: job.attempts_made,
            max_attempts: job.max_attempts,
            failed_reason: job.failed_reason,
            return_value,
            created_at: rfc3339(job.created_at),
            started_at: job.started_at.map(rfc3339),
            finished_at: job.finished_at.map(rfc3339),
        }
    }
}

/// One queue's state breakdown plus its configured worker count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatsView {
    pub queue: String,
    pub workers: usize,
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

fn rfc3339(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Handle to drive the scheduler from outside the loop.
#[derive(Clone)]
pub struct MonitorHandle {
    command_tx: mpsc::Sender<MonitorCommand>,
    store: Arc<dyn JobQueueStore>,
    general_workers: usize,
    dedicated_workers: usize,
}

impl MonitorHandle {
    pub fn new(
        command_tx: mpsc::Sender<MonitorCommand>,
        store: Arc<dyn JobQueueStore>,
        general_workers: usize,
        dedicated_workers: usize,
    ) -> Self {
        Self {
            command_tx,
            store,
            general_workers,
            dedicated_workers,
        }
    }

    /// Queue a scan by its human-facing key.
    pub async fn trigger(&self, key: &str) -> Result<TriggeredJob, TriggerError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(MonitorCommand::Trigger {
                key: key.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| TriggerError::Internal("Scheduler not available".to_string()))?;

        response_rx
            .await
            .map_err(|_| TriggerError::Internal("Scheduler did not respond".to_string()))?
    }

    /// Inspect one job.
    /// Returns Ok(None) if the job does not exist.
    pub fn job_detail(&self, job_id: &str) -> Result<Option<JobDetailView>> {
        Ok(self.store.get_job(job_id)?.map(JobDetailView::from))
    }

    /// State breakdown for every queue.
    pub fn queue_stats(&self) -> Result<Vec<QueueStatsView>> {
        QueueName::all()
            .iter()
            .map(|&queue| {
                let counts = self.store.counts_by_state(queue)?;
                Ok(QueueStatsView {
                    queue: queue.as_str().to_string(),
                    workers: self.workers_for(queue),
                    waiting: counts.waiting,
                    active: counts.active,
                    completed: counts.completed,
                    failed: counts.failed,
                    delayed: counts.delayed,
                })
            })
            .collect()
    }

    fn workers_for(&self, queue: QueueName) -> usize {
        match queue {
            QueueName::Monitoring => self.general_workers,
            QueueName::HighRisk | QueueName::Critical => self.dedicated_workers,
        }
    }
}
