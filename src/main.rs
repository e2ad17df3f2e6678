use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use supplier_monitor::config::{AppConfig, CliConfig, FileConfig};
use supplier_monitor::job_queue::{
    DispatchThrottler, JobDispatcher, NoOpThrottler, QueueName, RetryPolicy,
    SlidingWindowThrottler, SqliteJobQueueStore, WorkerPool,
};
use supplier_monitor::notifications::{
    DedupGuard, EmailTransport, NotificationRouter, SmtpEmailTransport, SqliteNotificationStore,
};
use supplier_monitor::rules::ScanContext;
use supplier_monitor::scheduler::create_scheduler;
use supplier_monitor::suppliers::SqliteSupplierGateway;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the monitor's SQLite databases.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. File values override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// IANA timezone used to evaluate recurring schedules.
    #[clap(long, default_value = "UTC")]
    pub timezone: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };

    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        timezone: cli_args.timezone.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening fleet database at {:?}...", config.fleet_db_path());
    let gateway = Arc::new(SqliteSupplierGateway::new(config.fleet_db_path())?);

    info!(
        "Opening notifications database at {:?}...",
        config.notifications_db_path()
    );
    let notification_store =
        Arc::new(SqliteNotificationStore::new(config.notifications_db_path())?);

    let email_transport: Option<Arc<dyn EmailTransport>> = if config.email.enabled {
        info!(
            "Email notifications enabled via {}:{}",
            config.email.smtp_host, config.email.smtp_port
        );
        Some(Arc::new(SmtpEmailTransport::new(
            &config.email.smtp_host,
            config.email.smtp_port,
            config.email.username.as_deref(),
            config.email.password.as_deref(),
            &config.email.from_address,
        )?))
    } else {
        None
    };

    let router = Arc::new(NotificationRouter::new(
        gateway.clone(),
        notification_store.clone(),
        notification_store.clone(),
        email_transport,
        config.monitor.quiet_hours_enabled,
    ));
    let guard = DedupGuard::new(notification_store.clone());

    let dispatcher = Arc::new(JobDispatcher::new(ScanContext {
        gateway: gateway.clone(),
        router,
        guard,
        batch_size: config.monitor.batch_size,
    }));

    let throttler: Arc<dyn DispatchThrottler> = if config.monitor.max_jobs_per_second == 0 {
        Arc::new(NoOpThrottler)
    } else {
        Arc::new(SlidingWindowThrottler::new(
            config.monitor.max_jobs_per_second,
        ))
    };
    let retry_policy = RetryPolicy::new(&config.monitor);

    info!("Opening job queue database at {:?}...", config.jobs_db_path());
    let job_store = Arc::new(SqliteJobQueueStore::new(config.jobs_db_path())?);

    let (mut scheduler, monitor_handle) =
        create_scheduler(job_store.clone(), config.monitor.clone());

    // Recover anything the previous run left active and register the
    // recurring definitions before any worker can claim work.
    scheduler.startup()?;

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::new(
        job_store.clone(),
        dispatcher,
        throttler,
        retry_policy,
        Duration::from_millis(config.monitor.poll_interval_ms),
    );

    let mut worker_handles = Vec::new();
    worker_handles.extend(pool.spawn(
        QueueName::Monitoring,
        config.monitor.general_workers,
        &shutdown,
    ));
    worker_handles.extend(pool.spawn(
        QueueName::HighRisk,
        config.monitor.dedicated_workers,
        &shutdown,
    ));
    worker_handles.extend(pool.spawn(
        QueueName::Critical,
        config.monitor.dedicated_workers,
        &shutdown,
    ));

    let scheduler_shutdown = shutdown.clone();
    let scheduler_task = tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    });

    for stats in monitor_handle.queue_stats()? {
        info!(
            "Queue {} ready ({} workers, {} waiting)",
            stats.queue, stats.workers, stats.waiting
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, stopping...");
    shutdown.cancel();

    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!("Worker task failed: {}", e);
        }
    }
    if let Err(e) = scheduler_task.await {
        error!("Scheduler task failed: {}", e);
    }

    info!("Supplier monitor stopped");
    Ok(())
}
