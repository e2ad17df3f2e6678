//! The scheduler loop: recurring registration, warm-up, due-enqueue and
//! queue housekeeping.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handle::{MonitorCommand, MonitorHandle, TriggerError, TriggeredJob};
use super::recurring::{default_definitions, next_occurrence};
use crate::config::MonitorSettings;
use crate::job_queue::{JobKind, JobPriority, JobQueueStore, QueueName};

/// Seconds between warm-up scans so a cold start does not run every rule in
/// the same instant.
const WARMUP_STAGGER_SECS: i64 = 10;

/// Owns the durable recurring definitions and keeps the queues healthy.
pub struct MonitorScheduler {
    store: Arc<dyn JobQueueStore>,
    command_rx: mpsc::Receiver<MonitorCommand>,
    settings: MonitorSettings,
}

impl MonitorScheduler {
    fn new(
        store: Arc<dyn JobQueueStore>,
        command_rx: mpsc::Receiver<MonitorCommand>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            store,
            command_rx,
            settings,
        }
    }

    /// Startup pass, run before any worker claims: recover jobs a previous
    /// process left active, replace the recurring set and queue the warm-up
    /// scans. Failures here are fatal; a monitor without its schedule is
    /// useless.
    pub fn startup(&self) -> Result<()> {
        let now = Utc::now();

        let recovered = self
            .store
            .recover_stale(now.timestamp(), 0)
            .context("Failed to recover jobs from the previous run")?;
        if recovered > 0 {
            info!("Recovered {} jobs left active by a previous run", recovered);
        }

        let stored = default_definitions()
            .iter()
            .map(|def| def.to_stored(&self.settings.timezone, now))
            .collect::<Result<Vec<_>>>()?;
        self.store
            .replace_recurring(QueueName::all(), &stored)
            .context("Failed to register recurring jobs")?;
        info!(
            "Registered {} recurring jobs (timezone={})",
            stored.len(),
            self.settings.timezone
        );

        self.queue_warmup(now.timestamp())?;
        Ok(())
    }

    /// One delayed job per scan kind, staggered so a fresh process reports
    /// on the fleet without waiting for the next cron tick. The weekly
    /// report keeps its weekly cadence and is not warmed up.
    fn queue_warmup(&self, now: i64) -> Result<()> {
        let scan_kinds = JobKind::all()
            .iter()
            .filter(|kind| **kind != JobKind::WeeklyReport);

        for (i, kind) in scan_kinds.enumerate() {
            let delay = WARMUP_STAGGER_SECS * (i as i64 + 1);
            self.store.enqueue_delayed(
                *kind,
                JobPriority::Normal,
                self.settings.max_attempts,
                now + delay,
            )?;
            debug!("Warm-up {} queued in {}s", kind.as_str(), delay);
        }
        Ok(())
    }

    /// Main scheduler loop - call from a spawned task.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            "Scheduler starting (housekeeping_interval={}s)",
            self.settings.housekeeping_interval_secs
        );

        loop {
            self.housekeeping();

            let sleep_duration = self.time_until_next_recurring();
            debug!("Scheduler sleeping for {:?}", sleep_duration);

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.enqueue_due_recurring();
                }
                Some(cmd) = self.command_rx.recv() => {
                    self.handle_command(cmd);
                }
                _ = shutdown.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        info!("Scheduler stopped");
    }

    fn handle_command(&self, cmd: MonitorCommand) {
        match cmd {
            MonitorCommand::Trigger { key, response } => {
                let _ = response.send(self.trigger(&key));
            }
        }
    }

    /// Queue a manual scan at the head of its queue.
    fn trigger(&self, key: &str) -> Result<TriggeredJob, TriggerError> {
        let kind = JobKind::from_trigger_key(key)
            .ok_or_else(|| TriggerError::UnknownKey(key.to_string()))?;

        let job = self
            .store
            .enqueue(kind, JobPriority::Manual, self.settings.max_attempts, true)
            .map_err(|e| TriggerError::Internal(e.to_string()))?;

        info!("Manual trigger {} queued job {}", key, job.id);
        Ok(TriggeredJob {
            job_id: job.id,
            kind: job.kind,
            status: "queued".to_string(),
        })
    }

    /// Time until the earliest recurring definition is due, capped at the
    /// housekeeping interval so upkeep never starves.
    fn time_until_next_recurring(&self) -> Duration {
        let cap = Duration::from_secs(self.settings.housekeeping_interval_secs);

        let defs = match self.store.list_recurring() {
            Ok(defs) => defs,
            Err(e) => {
                error!("Failed to load recurring jobs: {}", e);
                return cap;
            }
        };

        // Ordered by next run time, so the first row is the earliest.
        let Some(earliest) = defs.first() else {
            return cap;
        };

        let until = earliest.next_run_at - Utc::now().timestamp();
        if until <= 0 {
            Duration::ZERO
        } else {
            cap.min(Duration::from_secs(until as u64))
        }
    }

    /// Enqueue every recurring definition whose time has come and advance it
    /// to its next occurrence.
    fn enqueue_due_recurring(&self) {
        let now = Utc::now();
        let defs = match self.store.list_recurring() {
            Ok(defs) => defs,
            Err(e) => {
                error!("Failed to load recurring jobs: {}", e);
                return;
            }
        };

        for def in defs {
            if def.next_run_at > now.timestamp() {
                break;
            }
            let Some(kind) = JobKind::from_str(&def.kind) else {
                warn!("Recurring definition has unknown kind {}, skipping", def.kind);
                continue;
            };
            let priority = JobPriority::from_ordinal(def.priority).unwrap_or(JobPriority::Normal);

            let next_run_at = match next_occurrence(&def.cron, &def.timezone, now) {
                Ok(ts) => ts,
                Err(e) => {
                    error!(
                        "Recurring {} has a broken schedule, backing off an hour: {}",
                        def.kind, e
                    );
                    let _ = self.store.mark_recurring_run(
                        &def.kind,
                        now.timestamp(),
                        now.timestamp() + 3600,
                    );
                    continue;
                }
            };

            if let Err(e) = self
                .store
                .enqueue(kind, priority, self.settings.max_attempts, false)
            {
                error!("Failed to enqueue recurring {}: {}", def.kind, e);
                continue;
            }
            info!("Recurring {} enqueued", def.kind);

            if let Err(e) = self
                .store
                .mark_recurring_run(&def.kind, now.timestamp(), next_run_at)
            {
                error!("Failed to advance recurring {}: {}", def.kind, e);
            }
        }
    }

    /// Promote due delayed jobs, requeue stalled active jobs and prune old
    /// terminal ones.
    fn housekeeping(&self) {
        let now = Utc::now().timestamp();

        match self.store.promote_due(now) {
            Ok(count) if count > 0 => debug!("Promoted {} delayed jobs", count),
            Ok(_) => {}
            Err(e) => error!("Failed to promote delayed jobs: {}", e),
        }

        match self
            .store
            .recover_stale(now, self.settings.stale_active_threshold_secs as i64)
        {
            Ok(count) if count > 0 => warn!("Recovered {} stalled jobs", count),
            Ok(_) => {}
            Err(e) => error!("Failed to recover stalled jobs: {}", e),
        }

        let cutoff = now - (self.settings.completed_retention_days as i64) * 86_400;
        match self.store.prune_finished(cutoff) {
            Ok(count) if count > 0 => debug!("Pruned {} finished jobs", count),
            Ok(_) => {}
            Err(e) => error!("Failed to prune finished jobs: {}", e),
        }
    }
}

/// Create a scheduler and the handle that drives it.
pub fn create_scheduler(
    store: Arc<dyn JobQueueStore>,
    settings: MonitorSettings,
) -> (MonitorScheduler, MonitorHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);

    let handle = MonitorHandle::new(
        command_tx,
        store.clone(),
        settings.general_workers,
        settings.dedicated_workers,
    );
    let scheduler = MonitorScheduler::new(store, command_rx, settings);

    (scheduler, handle)
}
