//! Common test infrastructure
//!
//! Wires a complete monitor engine over temporary on-disk databases, the
//! way the binary assembles it, minus the process-level pieces. Each test
//! gets an isolated engine with its own fleet, notification and job stores.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestMonitor;
//!
//! #[tokio::test]
//! async fn test_high_risk_scan() {
//!     let monitor = TestMonitor::spawn().await;
//!     monitor.seed_vendor("v1", "owner");
//!
//!     let job = monitor.run_trigger("high-risk").await;
//!     assert_eq!(job.state, supplier_monitor::job_queue::JobState::Completed);
//!     monitor.shutdown().await;
//! }
//! ```

// Shared across the e2e test binaries; not every binary uses every helper.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use supplier_monitor::config::MonitorSettings;
use supplier_monitor::job_queue::{
    JobDispatcher, JobQueueStore, NoOpThrottler, QueueName, QueuedJob, RetryPolicy,
    SqliteJobQueueStore, WorkerPool,
};
use supplier_monitor::notifications::{
    DedupGuard, EmailTransport, Notification, NotificationPreferences, NotificationRouter,
    NotificationStore, PreferenceStore, SqliteNotificationStore,
};
use supplier_monitor::rules::ScanContext;
use supplier_monitor::scheduler::{create_scheduler, MonitorHandle};
use supplier_monitor::suppliers::{RiskLevel, SqliteSupplierGateway, Supplier, User, Vendor};

/// Email transport that records sends instead of talking to a relay.
#[derive(Default)]
pub struct RecordingEmailTransport {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingEmailTransport {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailTransport for RecordingEmailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// A fully wired monitor engine over a temporary directory: stores, router,
/// dispatcher, workers and scheduler, all running until `shutdown`.
pub struct TestMonitor {
    pub gateway: Arc<SqliteSupplierGateway>,
    pub notifications: Arc<SqliteNotificationStore>,
    pub jobs: Arc<SqliteJobQueueStore>,
    pub handle: MonitorHandle,
    pub email: Arc<RecordingEmailTransport>,
    shutdown: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    dir: TempDir,
}

/// Settings tuned so tests never sit in real backoff or poll intervals.
fn test_settings() -> MonitorSettings {
    MonitorSettings {
        general_workers: 2,
        dedicated_workers: 1,
        initial_backoff_secs: 0,
        poll_interval_ms: 10,
        housekeeping_interval_secs: 1,
        ..Default::default()
    }
}

impl TestMonitor {
    /// Spawn workers and the scheduler loop without running startup, so no
    /// recurring definitions or warmup jobs interfere with scan assertions.
    pub async fn spawn() -> Self {
        Self::spawn_inner(TempDir::new().unwrap(), false).await
    }

    /// Spawn the full engine including scheduler startup (stale recovery,
    /// recurring registration, warmup).
    pub async fn spawn_with_startup() -> Self {
        Self::spawn_inner(TempDir::new().unwrap(), true).await
    }

    /// Spawn the full engine over databases prepared by the caller.
    pub async fn spawn_with_startup_in(dir: TempDir) -> Self {
        Self::spawn_inner(dir, true).await
    }

    async fn spawn_inner(dir: TempDir, run_startup: bool) -> Self {
        let settings = test_settings();

        let gateway = Arc::new(SqliteSupplierGateway::new(dir.path().join("fleet.db")).unwrap());
        let notifications =
            Arc::new(SqliteNotificationStore::new(dir.path().join("notifications.db")).unwrap());
        let email = Arc::new(RecordingEmailTransport::default());

        let router = Arc::new(NotificationRouter::new(
            gateway.clone(),
            notifications.clone(),
            notifications.clone(),
            Some(email.clone() as Arc<dyn EmailTransport>),
            false,
        ));
        let guard = DedupGuard::new(notifications.clone());
        let dispatcher = Arc::new(JobDispatcher::new(ScanContext {
            gateway: gateway.clone(),
            router,
            guard,
            batch_size: settings.batch_size,
        }));

        let jobs = Arc::new(SqliteJobQueueStore::new(dir.path().join("jobs.db")).unwrap());
        let (mut scheduler, handle) = create_scheduler(jobs.clone(), settings.clone());
        if run_startup {
            scheduler.startup().unwrap();
        }

        let shutdown = CancellationToken::new();
        let pool = WorkerPool::new(
            jobs.clone(),
            dispatcher,
            Arc::new(NoOpThrottler),
            RetryPolicy::new(&settings),
            Duration::from_millis(settings.poll_interval_ms),
        );
        let mut tasks = Vec::new();
        tasks.extend(pool.spawn(QueueName::Monitoring, settings.general_workers, &shutdown));
        tasks.extend(pool.spawn(QueueName::HighRisk, settings.dedicated_workers, &shutdown));
        tasks.extend(pool.spawn(QueueName::Critical, settings.dedicated_workers, &shutdown));

        let scheduler_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            scheduler.run(scheduler_shutdown).await;
        }));

        Self {
            gateway,
            notifications,
            jobs,
            handle,
            email,
            shutdown,
            tasks,
            dir,
        }
    }

    /// Stop the engine and bring it back up over the same databases, the
    /// way a process restart would.
    pub async fn restart(self) -> Self {
        let TestMonitor {
            shutdown,
            tasks,
            dir,
            ..
        } = self;
        shutdown.cancel();
        for task in tasks {
            let _ = task.await;
        }
        Self::spawn_inner(dir, true).await
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }

    /// Trigger a scan by key and wait for the resulting job to finish.
    pub async fn run_trigger(&self, key: &str) -> QueuedJob {
        let triggered = self.handle.trigger(key).await.unwrap();
        self.wait_for_job(&triggered.job_id).await
    }

    /// Poll until the job reaches a terminal state. Covers retry cycles:
    /// the housekeeping tick promotes parked retries within a second.
    pub async fn wait_for_job(&self, job_id: &str) -> QueuedJob {
        for _ in 0..500 {
            if let Some(job) = self.jobs.get_job(job_id).unwrap() {
                if job.state.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not reach a terminal state in time", job_id);
    }

    /// The job's stored return value parsed as JSON.
    pub fn outcome_of(&self, job: &QueuedJob) -> serde_json::Value {
        serde_json::from_str(job.return_value.as_deref().unwrap_or("null")).unwrap()
    }

    pub fn seed_vendor(&self, vendor_id: &str, owner_id: &str) {
        self.gateway
            .upsert_vendor(&Vendor {
                id: vendor_id.to_string(),
                name: format!("Vendor {}", vendor_id),
                owner_user_id: owner_id.to_string(),
            })
            .unwrap();
        self.seed_user(owner_id);
    }

    /// Register a vendor whose owner user id has no user record behind it.
    pub fn seed_vendor_without_owner_record(&self, vendor_id: &str, owner_id: &str) {
        self.gateway
            .upsert_vendor(&Vendor {
                id: vendor_id.to_string(),
                name: format!("Vendor {}", vendor_id),
                owner_user_id: owner_id.to_string(),
            })
            .unwrap();
    }

    pub fn seed_user(&self, user_id: &str) {
        self.gateway
            .upsert_user(&User {
                id: user_id.to_string(),
                email: format!("{}@example.com", user_id),
                name: format!("User {}", user_id),
            })
            .unwrap();
    }

    pub fn seed_supplier(&self, supplier: &Supplier) {
        self.gateway.upsert_supplier(supplier).unwrap();
    }

    pub fn set_preferences(&self, user_id: &str, prefs: &NotificationPreferences) {
        self.notifications.update_preferences(user_id, prefs).unwrap();
    }

    pub fn notifications_for(&self, user_id: &str) -> Vec<Notification> {
        self.notifications
            .get_user_notifications(user_id, 100, 0)
            .unwrap()
    }
}

/// A supplier of the given risk level under `vendor_id`, active and without
/// contract or own user until the builders add them.
pub fn supplier(id: &str, vendor_id: &str, risk: RiskLevel) -> Supplier {
    Supplier::new(
        id.to_string(),
        format!("Supplier {}", id),
        vendor_id.to_string(),
        risk,
    )
}
