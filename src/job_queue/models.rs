//! Job queue domain models.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// The closed set of background job kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    HighRiskScan,
    ContractExpiryScan,
    AssessmentScan,
    MissingAssessmentScan,
    CriticalCompoundScan,
    WeeklyReport,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::HighRiskScan => "high_risk_scan",
            JobKind::ContractExpiryScan => "contract_expiry_scan",
            JobKind::AssessmentScan => "assessment_scan",
            JobKind::MissingAssessmentScan => "missing_assessment_scan",
            JobKind::CriticalCompoundScan => "critical_compound_scan",
            JobKind::WeeklyReport => "weekly_report",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "high_risk_scan" => Some(JobKind::HighRiskScan),
            "contract_expiry_scan" => Some(JobKind::ContractExpiryScan),
            "assessment_scan" => Some(JobKind::AssessmentScan),
            "missing_assessment_scan" => Some(JobKind::MissingAssessmentScan),
            "critical_compound_scan" => Some(JobKind::CriticalCompoundScan),
            "weekly_report" => Some(JobKind::WeeklyReport),
            _ => None,
        }
    }

    /// Maps a human-facing trigger key to a job kind.
    pub fn from_trigger_key(key: &str) -> Option<Self> {
        match key {
            "high-risk" => Some(JobKind::HighRiskScan),
            "contracts" => Some(JobKind::ContractExpiryScan),
            "assessments" => Some(JobKind::AssessmentScan),
            "critical" => Some(JobKind::CriticalCompoundScan),
            "report" => Some(JobKind::WeeklyReport),
            _ => None,
        }
    }

    /// The queue a kind runs on. The two always-HIGH rules get dedicated
    /// queues so a backlog in one category cannot starve the others.
    pub fn queue(&self) -> QueueName {
        match self {
            JobKind::HighRiskScan => QueueName::HighRisk,
            JobKind::CriticalCompoundScan => QueueName::Critical,
            JobKind::ContractExpiryScan
            | JobKind::AssessmentScan
            | JobKind::MissingAssessmentScan
            | JobKind::WeeklyReport => QueueName::Monitoring,
        }
    }

    pub fn all() -> &'static [JobKind] {
        &[
            JobKind::HighRiskScan,
            JobKind::ContractExpiryScan,
            JobKind::AssessmentScan,
            JobKind::MissingAssessmentScan,
            JobKind::CriticalCompoundScan,
            JobKind::WeeklyReport,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    /// General-purpose queue for the remaining scans and the weekly report.
    Monitoring,
    /// Dedicated queue for the high-risk scan.
    HighRisk,
    /// Dedicated queue for the critical compound scan.
    Critical,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Monitoring => "monitoring",
            QueueName::HighRisk => "high-risk",
            QueueName::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "monitoring" => Some(QueueName::Monitoring),
            "high-risk" => Some(QueueName::HighRisk),
            "critical" => Some(QueueName::Critical),
            _ => None,
        }
    }

    pub fn all() -> &'static [QueueName] {
        &[QueueName::Monitoring, QueueName::HighRisk, QueueName::Critical]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(JobState::Waiting),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            "delayed" => Some(JobState::Delayed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Claim order: lower ordinal first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    Manual = 1,
    High = 2,
    Normal = 3,
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Manual => "manual",
            JobPriority::High => "high",
            JobPriority::Normal => "normal",
        }
    }

    pub fn ordinal(&self) -> i64 {
        *self as i64
    }

    pub fn from_ordinal(value: i64) -> Option<Self> {
        match value {
            1 => Some(JobPriority::Manual),
            2 => Some(JobPriority::High),
            3 => Some(JobPriority::Normal),
            _ => None,
        }
    }
}

/// The JSON document stored in a job's payload column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub kind: String,
    pub priority: String,
    /// RFC3339 creation time of the payload.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_trigger: Option<bool>,
}

impl JobPayload {
    pub fn new(kind: JobKind, priority: JobPriority, manual: bool) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            priority: priority.as_str().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            manual_trigger: manual.then_some(true),
        }
    }
}

/// A job row as stored. `kind` stays a raw string so a row written by a
/// newer process still loads; the dispatcher decides what to do with a kind
/// it cannot decode.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: String,
    pub kind: String,
    pub queue: String,
    pub payload: String,
    pub priority: i64,
    pub state: JobState,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub failed_reason: Option<String>,
    pub return_value: Option<String>,
    pub run_at: i64,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

/// Per-queue job counts broken down by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.waiting + self.active + self.completed + self.failed + self.delayed
    }
}

/// What a handler run produced, recorded on the job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub success: bool,
    pub job_id: String,
    pub completed_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
}

impl JobOutcome {
    pub fn success(job_id: &str, report: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            job_id: job_id.to_string(),
            completed_at: Utc::now().to_rfc3339(),
            report,
        }
    }
}
