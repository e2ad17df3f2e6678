//! Routes claimed jobs to the evaluator matching their kind.

use super::models::{JobKind, JobOutcome, QueuedJob};
use crate::rules::{self, ScanContext, ScanError, ScanReport};

/// Maps a job's kind onto one of the rule evaluators and packages the scan
/// report as the job's return value.
///
/// The kind match is exhaustive over the closed enum; a payload whose kind
/// cannot be decoded fails right here and the retry policy treats that as
/// permanent.
pub struct JobDispatcher {
    ctx: ScanContext,
}

impl JobDispatcher {
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    pub async fn dispatch(&self, job: &QueuedJob) -> Result<JobOutcome, ScanError> {
        let kind =
            JobKind::from_str(&job.kind).ok_or_else(|| ScanError::UnknownKind(job.kind.clone()))?;

        let report = self.run_evaluator(kind).await?;
        Ok(JobOutcome::success(
            &job.id,
            serde_json::to_value(report).ok(),
        ))
    }

    async fn run_evaluator(&self, kind: JobKind) -> Result<ScanReport, ScanError> {
        match kind {
            JobKind::HighRiskScan => rules::high_risk::run(&self.ctx).await,
            JobKind::ContractExpiryScan => rules::contract_expiry::run(&self.ctx).await,
            JobKind::AssessmentScan => rules::assessment::run_incomplete(&self.ctx).await,
            JobKind::MissingAssessmentScan => rules::assessment::run_missing(&self.ctx).await,
            JobKind::CriticalCompoundScan => rules::critical_compound::run(&self.ctx).await,
            JobKind::WeeklyReport => rules::weekly_report::run(&self.ctx).await,
        }
    }
}
