mod file_config;

pub use file_config::{EmailConfig, FileConfig, MonitorConfig};

use anyhow::{bail, Result};
use chrono_tz::Tz;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub timezone: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,

    // Feature configs (with defaults)
    pub monitor: MonitorSettings,
    pub email: EmailSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("Database path is not a directory: {:?}", db_dir);
        }

        let timezone = file.timezone.unwrap_or_else(|| cli.timezone.clone());
        if timezone.parse::<Tz>().is_err() {
            bail!("Unknown timezone: {}", timezone);
        }

        // Monitor settings - merge file config with defaults
        let mon_file = file.monitor.unwrap_or_default();
        let monitor = MonitorSettings {
            general_workers: mon_file.general_workers.unwrap_or(5),
            dedicated_workers: mon_file.dedicated_workers.unwrap_or(3),
            max_jobs_per_second: mon_file.max_jobs_per_second.unwrap_or(10),
            max_attempts: mon_file.max_attempts.unwrap_or(3),
            initial_backoff_secs: mon_file.initial_backoff_secs.unwrap_or(5),
            max_backoff_secs: mon_file.max_backoff_secs.unwrap_or(600), // 10 minutes
            backoff_multiplier: mon_file.backoff_multiplier.unwrap_or(2.0),
            stale_active_threshold_secs: mon_file.stale_active_threshold_secs.unwrap_or(600),
            completed_retention_days: mon_file.completed_retention_days.unwrap_or(7),
            batch_size: mon_file.batch_size.unwrap_or(100),
            poll_interval_ms: mon_file.poll_interval_ms.unwrap_or(1000),
            housekeeping_interval_secs: mon_file.housekeeping_interval_secs.unwrap_or(10),
            timezone,
            quiet_hours_enabled: mon_file.quiet_hours_enabled.unwrap_or(false),
        };

        // Email settings - [email] section only, credentials never come from CLI
        let email_file = file.email.unwrap_or_default();
        let email_enabled = email_file.enabled.unwrap_or(false);
        if email_enabled {
            if email_file.smtp_host.is_none() {
                bail!("email.smtp_host is required when email is enabled");
            }
            if email_file.from_address.is_none() {
                bail!("email.from_address is required when email is enabled");
            }
        }
        let email = EmailSettings {
            enabled: email_enabled,
            smtp_host: email_file.smtp_host.unwrap_or_default(),
            smtp_port: email_file.smtp_port.unwrap_or(587),
            username: email_file.username,
            password: email_file.password,
            from_address: email_file.from_address.unwrap_or_default(),
        };

        Ok(Self {
            db_dir,
            monitor,
            email,
        })
    }

    pub fn fleet_db_path(&self) -> PathBuf {
        self.db_dir.join("fleet.db")
    }

    pub fn notifications_db_path(&self) -> PathBuf {
        self.db_dir.join("notifications.db")
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.db_dir.join("jobs.db")
    }
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub general_workers: usize,
    pub dedicated_workers: usize,
    pub max_jobs_per_second: u32,
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub stale_active_threshold_secs: u64,
    pub completed_retention_days: u32,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub housekeeping_interval_secs: u64,
    pub timezone: String,
    pub quiet_hours_enabled: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            general_workers: 5,
            dedicated_workers: 3,
            max_jobs_per_second: 10,
            max_attempts: 3,
            initial_backoff_secs: 5,
            max_backoff_secs: 600, // 10 minutes
            backoff_multiplier: 2.0,
            stale_active_threshold_secs: 600,
            completed_retention_days: 7,
            batch_size: 100,
            poll_interval_ms: 1000,
            housekeeping_interval_secs: 10,
            timezone: "UTC".to_string(),
            quiet_hours_enabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            username: None,
            password: None,
            from_address: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    fn base_cli(db_dir: &TempDir) -> CliConfig {
        CliConfig {
            db_dir: Some(db_dir.path().to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_with_cli_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&base_cli(&dir), None).unwrap();

        assert_eq!(config.db_dir, dir.path());
        assert_eq!(config.monitor.general_workers, 5);
        assert_eq!(config.monitor.dedicated_workers, 3);
        assert_eq!(config.monitor.max_jobs_per_second, 10);
        assert_eq!(config.monitor.max_attempts, 3);
        assert_eq!(config.monitor.housekeeping_interval_secs, 10);
        assert_eq!(config.monitor.timezone, "UTC");
        assert!(!config.monitor.quiet_hours_enabled);
        assert!(!config.email.enabled);
    }

    #[test]
    fn test_toml_overrides_cli() {
        let cli_dir = TempDir::new().unwrap();
        let file_dir = TempDir::new().unwrap();

        let file = FileConfig {
            db_dir: Some(file_dir.path().to_string_lossy().to_string()),
            timezone: Some("America/New_York".to_string()),
            monitor: Some(MonitorConfig {
                general_workers: Some(8),
                max_attempts: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&base_cli(&cli_dir), Some(file)).unwrap();

        assert_eq!(config.db_dir, file_dir.path());
        assert_eq!(config.monitor.timezone, "America/New_York");
        assert_eq!(config.monitor.general_workers, 8);
        assert_eq!(config.monitor.max_attempts, 5);
        // Fields absent from the file keep their defaults
        assert_eq!(config.monitor.dedicated_workers, 3);
        assert_eq!(config.monitor.batch_size, 100);
    }

    #[test]
    fn test_db_dir_required() {
        let result = AppConfig::resolve(&CliConfig::default(), None);

        let err = result.unwrap_err().to_string();
        assert!(err.contains("db_dir"));
    }

    #[test]
    fn test_db_dir_must_exist() {
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/nonexistent/monitor-db")),
            ..Default::default()
        };

        let err = AppConfig::resolve(&cli, None).unwrap_err().to_string();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn test_db_dir_must_be_directory() {
        let file = NamedTempFile::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(file.path().to_path_buf()),
            ..Default::default()
        };

        let err = AppConfig::resolve(&cli, None).unwrap_err().to_string();
        assert!(err.contains("not a directory"));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(dir.path().to_path_buf()),
            timezone: "Mars/Olympus".to_string(),
        };

        let err = AppConfig::resolve(&cli, None).unwrap_err().to_string();
        assert!(err.contains("Unknown timezone"));
    }

    #[test]
    fn test_email_enabled_requires_smtp_host() {
        let dir = TempDir::new().unwrap();
        let file = FileConfig {
            email: Some(EmailConfig {
                enabled: Some(true),
                from_address: Some("alerts@example.com".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let err = AppConfig::resolve(&base_cli(&dir), Some(file))
            .unwrap_err()
            .to_string();
        assert!(err.contains("smtp_host"));
    }

    #[test]
    fn test_email_enabled_requires_from_address() {
        let dir = TempDir::new().unwrap();
        let file = FileConfig {
            email: Some(EmailConfig {
                enabled: Some(true),
                smtp_host: Some("smtp.example.com".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let err = AppConfig::resolve(&base_cli(&dir), Some(file))
            .unwrap_err()
            .to_string();
        assert!(err.contains("from_address"));
    }

    #[test]
    fn test_email_section_resolved() {
        let dir = TempDir::new().unwrap();
        let file = FileConfig {
            email: Some(EmailConfig {
                enabled: Some(true),
                smtp_host: Some("smtp.example.com".to_string()),
                username: Some("monitor".to_string()),
                password: Some("hunter2".to_string()),
                from_address: Some("alerts@example.com".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&base_cli(&dir), Some(file)).unwrap();

        assert!(config.email.enabled);
        assert_eq!(config.email.smtp_host, "smtp.example.com");
        assert_eq!(config.email.smtp_port, 587);
        assert_eq!(config.email.username.as_deref(), Some("monitor"));
        assert_eq!(config.email.from_address, "alerts@example.com");
    }

    #[test]
    fn test_db_path_helpers() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&base_cli(&dir), None).unwrap();

        assert_eq!(config.fleet_db_path(), dir.path().join("fleet.db"));
        assert_eq!(
            config.notifications_db_path(),
            dir.path().join("notifications.db")
        );
        assert_eq!(config.jobs_db_path(), dir.path().join("jobs.db"));
    }

    #[test]
    fn test_file_config_parses_sections() {
        let toml_str = r#"
            db_dir = "/var/lib/monitor"
            timezone = "Europe/Rome"

            [monitor]
            general_workers = 2
            quiet_hours_enabled = true

            [email]
            enabled = true
            smtp_host = "smtp.example.com"
        "#;

        let file: FileConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(file.db_dir.as_deref(), Some("/var/lib/monitor"));
        assert_eq!(file.timezone.as_deref(), Some("Europe/Rome"));

        let monitor = file.monitor.unwrap();
        assert_eq!(monitor.general_workers, Some(2));
        assert_eq!(monitor.quiet_hours_enabled, Some(true));
        assert_eq!(monitor.max_attempts, None);

        let email = file.email.unwrap();
        assert_eq!(email.enabled, Some(true));
        assert_eq!(email.smtp_host.as_deref(), Some("smtp.example.com"));
    }
}
