use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use spendflow_core::domain::identity::CompanyId;
use spendflow_core::domain::step::StepId;
use spendflow_db::ApprovalStepRepository;

use crate::actor::Actor;
use crate::errors::WorkflowError;
use crate::processor::{StepAction, StepProcessor};

#[derive(Clone, Debug)]
pub enum SweepScope {
    All,
    Company(CompanyId),
}

#[derive(Clone, Debug)]
pub struct SweepFailure {
    pub step_id: StepId,
    pub error: String,
}

#[derive(Clone, Debug, Default)]
pub struct SweepReport {
    pub scanned: usize,
    pub escalated: usize,
    /// Steps that resolved or escalated between listing and action; losing
    /// that race is expected and harmless.
    pub skipped: usize,
    pub failures: Vec<SweepFailure>,
}

/// Periodic overdue-step sweep. The external scheduler owns the cadence;
/// each invocation is a single pass and is idempotent per step.
pub struct EscalationScanner {
    steps: Arc<dyn ApprovalStepRepository>,
    processor: Arc<StepProcessor>,
    batch_limit: u32,
}

impl EscalationScanner {
    pub fn new(
        steps: Arc<dyn ApprovalStepRepository>,
        processor: Arc<StepProcessor>,
        batch_limit: u32,
    ) -> Self {
        Self { steps, processor, batch_limit }
    }

    pub async fn run_sweep(
        &self,
        scope: SweepScope,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, WorkflowError> {
        let company = match &scope {
            SweepScope::Company(company_id) => Some(company_id),
            SweepScope::All => None,
        };
        // Ascending due date: the most overdue steps escalate first, so a
        // truncated batch never starves the oldest items.
        let overdue = self.steps.list_overdue(company, now, self.batch_limit).await?;

        let mut report = SweepReport { scanned: overdue.len(), ..SweepReport::default() };
        for step in overdue {
            let result = self
                .processor
                .process_action(
                    &step.id,
                    &Actor::System,
                    StepAction::Escalate,
                    Some("auto-escalated".to_string()),
                    now,
                )
                .await;

            match result {
                Ok(_) => report.escalated += 1,
                Err(error) if error.is_conflict() => {
                    debug!(
                        event_name = "workflow.sweep_step_skipped",
                        step_id = %step.id.0,
                        error = %error,
                        "step changed state since listing; skipping"
                    );
                    report.skipped += 1;
                }
                Err(error) => {
                    // One bad step must not abort the sweep.
                    warn!(
                        event_name = "workflow.sweep_step_failed",
                        step_id = %step.id.0,
                        error = %error,
                        "escalation failed for step; continuing sweep"
                    );
                    report
                        .failures
                        .push(SweepFailure { step_id: step.id.clone(), error: error.to_string() });
                }
            }
        }

        info!(
            event_name = "workflow.sweep_completed",
            scanned = report.scanned,
            escalated = report.escalated,
            skipped = report.skipped,
            failed = report.failures.len(),
            "escalation sweep completed"
        );

        Ok(report)
    }
}
