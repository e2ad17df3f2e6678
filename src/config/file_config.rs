use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub timezone: Option<String>,

    // Feature configs
    pub monitor: Option<MonitorConfig>,
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub general_workers: Option<usize>,
    pub dedicated_workers: Option<usize>,
    pub max_jobs_per_second: Option<u32>,
    pub max_attempts: Option<u32>,
    pub initial_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub stale_active_threshold_secs: Option<u64>,
    pub completed_retention_days: Option<u32>,
    pub batch_size: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub housekeeping_interval_secs: Option<u64>,
    pub quiet_hours_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: Option<bool>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
}

impl FileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }
}
