//! The recurring scan schedule and its cron evaluation.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::job_queue::{JobKind, JobPriority, StoredRecurringJob};

/// One recurring scan: which kind fires on what cron pattern.
///
/// Patterns use the six-field form (sec min hour dom month dow).
#[derive(Debug, Clone)]
pub struct RecurringJobDef {
    pub kind: JobKind,
    pub cron: String,
    pub priority: JobPriority,
}

impl RecurringJobDef {
    fn new(kind: JobKind, cron: &str, priority: JobPriority) -> Self {
        Self {
            kind,
            cron: cron.to_string(),
            priority,
        }
    }

    /// Materialize this definition into its durable row, with the first
    /// occurrence computed from `now` in the given timezone.
    pub fn to_stored(&self, timezone: &str, now: DateTime<Utc>) -> Result<StoredRecurringJob> {
        Ok(StoredRecurringJob {
            kind: self.kind.as_str().to_string(),
            queue: self.kind.queue().as_str().to_string(),
            cron: self.cron.clone(),
            timezone: timezone.to_string(),
            priority: self.priority.ordinal(),
            next_run_at: next_occurrence(&self.cron, timezone, now)?,
            last_run_at: None,
        })
    }
}

/// The standing schedule. Daily scans are spread across the morning so the
/// fleet queries never pile up; the compound scan runs every six hours; the
/// digest fires Monday morning.
pub fn default_definitions() -> Vec<RecurringJobDef> {
    vec![
        RecurringJobDef::new(JobKind::HighRiskScan, "0 0 8 * * *", JobPriority::Normal),
        RecurringJobDef::new(JobKind::ContractExpiryScan, "0 30 8 * * *", JobPriority::Normal),
        RecurringJobDef::new(JobKind::AssessmentScan, "0 0 9 * * *", JobPriority::Normal),
        RecurringJobDef::new(
            JobKind::MissingAssessmentScan,
            "0 30 9 * * *",
            JobPriority::Normal,
        ),
        RecurringJobDef::new(
            JobKind::CriticalCompoundScan,
            "0 0 */6 * * *",
            JobPriority::Normal,
        ),
        RecurringJobDef::new(JobKind::WeeklyReport, "0 0 7 * * MON", JobPriority::Normal),
    ]
}

/// Next fire time of `cron` strictly after `after`, evaluated in `timezone`,
/// as unix seconds.
pub fn next_occurrence(cron: &str, timezone: &str, after: DateTime<Utc>) -> Result<i64> {
    let schedule =
        Schedule::from_str(cron).with_context(|| format!("Invalid cron pattern: {}", cron))?;
    let tz: Tz = timezone
        .parse()
        .map_err(|e| anyhow::anyhow!("Unknown timezone {}: {}", timezone, e))?;
    let next = schedule
        .after(&after.with_timezone(&tz))
        .next()
        .with_context(|| format!("Cron pattern {} has no future occurrence", cron))?;
    Ok(next.timestamp())
}
