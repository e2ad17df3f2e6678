//! Queue workers that claim jobs and settle their outcome.
//!
//! Each worker drains exactly one queue. It polls the store for a claimable
//! job, runs it through the dispatcher and records the result: completed,
//! parked for retry or failed for good. The shared throttler caps how fast
//! the whole pool may start jobs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::dispatcher::JobDispatcher;
use super::models::{QueueName, QueuedJob};
use super::retry_policy::RetryPolicy;
use super::store::JobQueueStore;
use super::throttle::DispatchThrottler;

/// A single worker loop bound to one queue.
pub struct QueueWorker {
    store: Arc<dyn JobQueueStore>,
    dispatcher: Arc<JobDispatcher>,
    throttler: Arc<dyn DispatchThrottler>,
    retry_policy: RetryPolicy,
    queue: QueueName,
    worker_id: usize,
    poll_interval: Duration,
}

impl QueueWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobQueueStore>,
        dispatcher: Arc<JobDispatcher>,
        throttler: Arc<dyn DispatchThrottler>,
        retry_policy: RetryPolicy,
        queue: QueueName,
        worker_id: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            throttler,
            retry_policy,
            queue,
            worker_id,
            poll_interval,
        }
    }

    /// Main worker loop - call from a spawned task.
    ///
    /// An in-flight job is always settled before the loop honors shutdown, so
    /// a clean stop never leaves active rows behind.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "{} worker {} starting (poll_interval={}ms)",
            self.queue.as_str(),
            self.worker_id,
            self.poll_interval.as_millis()
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            // Respect the shared dispatch budget before touching the queue.
            if let Err(wait) = self.throttler.check_dispatch().await {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.cancelled() => break,
                }
                continue;
            }

            let claimed = match self.store.claim_next(self.queue) {
                Ok(job) => job,
                Err(e) => {
                    error!(
                        "{} worker {} failed to poll the queue: {}",
                        self.queue.as_str(),
                        self.worker_id,
                        e
                    );
                    None
                }
            };

            let Some(job) = claimed else {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = shutdown.cancelled() => break,
                }
                continue;
            };

            self.throttler.record_dispatch().await;
            self.execute(&job).await;
        }

        info!(
            "{} worker {} stopped",
            self.queue.as_str(),
            self.worker_id
        );
    }

    /// Run one claimed job and write its terminal or retry state back.
    async fn execute(&self, job: &QueuedJob) {
        let started = Instant::now();

        match self.dispatcher.dispatch(job).await {
            Ok(outcome) => {
                info!(
                    "Job {} ({}) completed in {:?}",
                    job.id,
                    job.kind,
                    started.elapsed()
                );
                let return_value =
                    serde_json::to_string(&outcome).unwrap_or_else(|_| "{}".to_string());
                if let Err(e) = self.store.mark_completed(&job.id, &return_value) {
                    error!("Failed to record completion of job {}: {}", job.id, e);
                }
            }
            Err(err) if self.retry_policy.should_retry(&err, job.attempts_made) => {
                let run_at = self.retry_policy.next_retry_at(job.attempts_made);
                warn!(
                    "Job {} ({}) failed on attempt {}/{}, retry queued: {}",
                    job.id, job.kind, job.attempts_made, job.max_attempts, err
                );
                if let Err(e) = self.store.mark_retrying(&job.id, run_at, &err.to_string()) {
                    error!("Failed to park job {} for retry: {}", job.id, e);
                }
            }
            Err(err) => {
                error!(
                    "Job {} ({}) failed permanently after {} attempts: {}",
                    job.id, job.kind, job.attempts_made, err
                );
                if let Err(e) = self.store.mark_failed(&job.id, &err.to_string()) {
                    error!("Failed to record failure of job {}: {}", job.id, e);
                }
            }
        }
    }
}

/// Shared dependencies for the workers of every queue.
///
/// Workers are homogeneous; the queue they drain decides which jobs they
/// see, the dispatcher decides what those jobs do.
pub struct WorkerPool {
    store: Arc<dyn JobQueueStore>,
    dispatcher: Arc<JobDispatcher>,
    throttler: Arc<dyn DispatchThrottler>,
    retry_policy: RetryPolicy,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobQueueStore>,
        dispatcher: Arc<JobDispatcher>,
        throttler: Arc<dyn DispatchThrottler>,
        retry_policy: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            throttler,
            retry_policy,
            poll_interval,
        }
    }

    /// Spawn `count` workers draining `queue`, each on its own task.
    pub fn spawn(
        &self,
        queue: QueueName,
        count: usize,
        shutdown: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (1..=count)
            .map(|worker_id| {
                let worker = QueueWorker::new(
                    self.store.clone(),
                    self.dispatcher.clone(),
                    self.throttler.clone(),
                    self.retry_policy.clone(),
                    queue,
                    worker_id,
                    self.poll_interval,
                );
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(shutdown).await })
            })
            .collect()
    }
}
