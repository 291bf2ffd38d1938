use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use spendflow_core::chain::{ChainBuilder, CompanyConfigSource, OrgDirectory};
use spendflow_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use spendflow_core::domain::history::{ApprovalHistory, HistoryAction};
use spendflow_core::domain::identity::{Identity, Role};
use spendflow_core::domain::step::{ApprovalStep, StepId, StepStatus};
use spendflow_core::machine::{self, ExpenseEvent};
use spendflow_db::{ApprovalHistoryRepository, ApprovalStepRepository, ExpenseRepository};

use crate::errors::WorkflowError;
use crate::notify::{deliver_best_effort, Notification, NotificationSink, NotificationType};

#[derive(Clone, Debug)]
pub enum SubmitOutcome {
    /// Chain materialized; the expense now waits on its first step.
    ChainStarted { expense: Expense, steps: Vec<ApprovalStep> },
    /// Amount fell under the company's auto-approve threshold.
    AutoApproved { expense: Expense },
}

/// Drives an expense from draft into the approval workflow, and cancels
/// in-flight expenses.
pub struct SubmissionService {
    expenses: Arc<dyn ExpenseRepository>,
    steps: Arc<dyn ApprovalStepRepository>,
    history: Arc<dyn ApprovalHistoryRepository>,
    config_source: Arc<dyn CompanyConfigSource>,
    chain_builder: ChainBuilder<Arc<dyn OrgDirectory>>,
    notifications: Arc<dyn NotificationSink>,
}

impl SubmissionService {
    pub fn new(
        expenses: Arc<dyn ExpenseRepository>,
        steps: Arc<dyn ApprovalStepRepository>,
        history: Arc<dyn ApprovalHistoryRepository>,
        config_source: Arc<dyn CompanyConfigSource>,
        directory: Arc<dyn OrgDirectory>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            expenses,
            steps,
            history,
            config_source,
            chain_builder: ChainBuilder::new(directory),
            notifications,
        }
    }

    pub async fn submit(
        &self,
        expense_id: &ExpenseId,
        actor: &Identity,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, WorkflowError> {
        let expense = self
            .expenses
            .find_by_id(expense_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound { kind: "expense", id: expense_id.0.clone() })?;

        if actor.company_id != expense.company_id || actor.user_id != expense.employee_id {
            return Err(WorkflowError::UnauthorizedActor { actor_id: actor.user_id.0.clone() });
        }
        expense.validate().map_err(|error| WorkflowError::Validation(error.to_string()))?;

        let transition = machine::transition(expense.status, ExpenseEvent::Submit)?;
        let mut submitted = expense.clone();
        submitted.status = transition.to;
        submitted.updated_at = now;
        if !self.expenses.update_if_status(&submitted, ExpenseStatus::Draft).await? {
            return Err(WorkflowError::ExpenseAlreadyResolved {
                expense_id: expense.id.clone(),
                status: expense.status,
            });
        }

        self.history
            .append(
                ApprovalHistory::new(
                    submitted.id.clone(),
                    HistoryAction::Submitted,
                    actor.user_id.0.clone(),
                    now,
                )
                .with_status_change(ExpenseStatus::Draft.as_str(), submitted.status.as_str()),
            )
            .await?;

        let config =
            self.config_source.chain_config(&submitted.company_id).unwrap_or_default();

        if let Some(threshold) = config.auto_approve_under {
            if submitted.amount < threshold {
                return self.auto_approve(submitted, now).await;
            }
        }

        let rules = self.config_source.rules(&submitted.company_id);
        // A failed build leaves the expense in submitted for manual
        // remediation; it must never silently auto-approve.
        let planned = self.chain_builder.build(&submitted, &config, &rules, now)?;

        let steps: Vec<ApprovalStep> = planned
            .into_iter()
            .map(|plan| ApprovalStep {
                id: StepId(Uuid::new_v4().to_string()),
                expense_id: submitted.id.clone(),
                step_order: plan.step_order,
                approver_id: plan.approver_id,
                status: StepStatus::Pending,
                due_date: plan.due_date,
                approved_at: None,
                rejected_at: None,
                comments: None,
                rejection_reason: None,
                escalated_to: None,
                escalated_at: None,
                created_at: now,
                updated_at: now,
            })
            .collect();
        for step in &steps {
            self.steps.save(step.clone()).await?;
        }

        let transition = machine::transition(submitted.status, ExpenseEvent::ChainBuilt)?;
        let mut pending = submitted.clone();
        pending.status = transition.to;
        pending.updated_at = now;
        if !self.expenses.update_if_status(&pending, ExpenseStatus::Submitted).await? {
            return Err(WorkflowError::ExpenseAlreadyResolved {
                expense_id: submitted.id.clone(),
                status: submitted.status,
            });
        }

        info!(
            event_name = "workflow.expense_submitted",
            expense_id = %pending.id.0,
            employee_id = %pending.employee_id.0,
            chain_len = steps.len(),
            "expense submitted and approval chain started"
        );

        if let Some(first) = steps.first() {
            deliver_best_effort(
                self.notifications.as_ref(),
                Notification::new(
                    first.approver_id.clone(),
                    NotificationType::ApprovalRequired,
                    Some(pending.id.clone()),
                    Some(first.id.clone()),
                ),
            )
            .await;
        }

        Ok(SubmitOutcome::ChainStarted { expense: pending, steps })
    }

    async fn auto_approve(
        &self,
        submitted: Expense,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, WorkflowError> {
        let transition = machine::transition(submitted.status, ExpenseEvent::AutoApproved)?;
        let mut approved = submitted.clone();
        approved.status = transition.to;
        approved.approved_at = Some(now);
        approved.updated_at = now;
        if !self.expenses.update_if_status(&approved, ExpenseStatus::Submitted).await? {
            return Err(WorkflowError::ExpenseAlreadyResolved {
                expense_id: submitted.id.clone(),
                status: submitted.status,
            });
        }

        self.history
            .append(
                ApprovalHistory::new(
                    approved.id.clone(),
                    HistoryAction::Approved,
                    crate::actor::SYSTEM_ACTOR_ID,
                    now,
                )
                .with_status_change(ExpenseStatus::Submitted.as_str(), approved.status.as_str())
                .with_metadata("auto_approved", "true"),
            )
            .await?;

        info!(
            event_name = "workflow.expense_auto_approved",
            expense_id = %approved.id.0,
            amount = %approved.amount,
            "expense auto-approved under company threshold"
        );

        deliver_best_effort(
            self.notifications.as_ref(),
            Notification::new(
                approved.employee_id.clone(),
                NotificationType::ExpenseApproved,
                Some(approved.id.clone()),
                None,
            ),
        )
        .await;

        Ok(SubmitOutcome::AutoApproved { expense: approved })
    }

    /// Owner or a company admin may cancel while the expense is still in
    /// flight. Remaining non-terminal steps are cancelled with it.
    pub async fn cancel(
        &self,
        expense_id: &ExpenseId,
        actor: &Identity,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Expense, WorkflowError> {
        let expense = self
            .expenses
            .find_by_id(expense_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound { kind: "expense", id: expense_id.0.clone() })?;

        let authorized = actor.company_id == expense.company_id
            && (actor.user_id == expense.employee_id || actor.role == Role::Admin);
        if !authorized {
            return Err(WorkflowError::UnauthorizedActor { actor_id: actor.user_id.0.clone() });
        }

        let transition = machine::transition(expense.status, ExpenseEvent::Cancel)?;
        let mut cancelled = expense.clone();
        cancelled.status = transition.to;
        cancelled.updated_at = now;
        if !self.expenses.update_if_status(&cancelled, expense.status).await? {
            return Err(WorkflowError::ExpenseAlreadyResolved {
                expense_id: expense.id.clone(),
                status: expense.status,
            });
        }

        let chain = self.steps.list_for_expense(expense_id).await?;
        for step in chain {
            if step.status.is_terminal() {
                continue;
            }
            let mut stopped = step.clone();
            stopped.status = StepStatus::Cancelled;
            stopped.updated_at = now;
            // Losing this race means the step just resolved; the expense
            // itself is already cancelled, so let it stand.
            let _ = self.steps.update_if_status(&stopped, step.status).await?;
        }

        let mut row = ApprovalHistory::new(
            expense.id.clone(),
            HistoryAction::Cancelled,
            actor.user_id.0.clone(),
            now,
        )
        .with_status_change(expense.status.as_str(), cancelled.status.as_str());
        if let Some(reason) = reason {
            row = row.with_comment(reason);
        }
        self.history.append(row).await?;

        info!(
            event_name = "workflow.expense_cancelled",
            expense_id = %cancelled.id.0,
            actor = %actor.user_id.0,
            "expense cancelled"
        );

        Ok(cancelled)
    }
}
