use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use spendflow_core::chain::{CompanyConfigSource, OrgDirectory};
use spendflow_core::domain::escalation::EscalationLog;
use spendflow_core::domain::expense::{Expense, ExpenseStatus};
use spendflow_core::domain::history::{ApprovalHistory, HistoryAction};
use spendflow_core::domain::identity::UserId;
use spendflow_core::domain::step::{active_step, ApprovalStep, StepId, StepStatus};
use spendflow_core::machine::{self, ExpenseEvent};
use spendflow_db::{
    ApprovalHistoryRepository, ApprovalStepRepository, EscalationLogRepository, ExpenseRepository,
};

use crate::actor::Actor;
use crate::errors::WorkflowError;
use crate::notify::{deliver_best_effort, Notification, NotificationSink, NotificationType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepAction {
    Approve,
    Reject,
    Escalate,
}

#[derive(Clone, Debug)]
pub struct ActionOutcome {
    pub step: ApprovalStep,
    pub expense: Expense,
}

/// Executes one approve/reject/escalate action against one step. The check
/// and the status flip are split: preconditions read freely, the mutation
/// is a conditional update so concurrent actors get exactly one winner.
pub struct StepProcessor {
    expenses: Arc<dyn ExpenseRepository>,
    steps: Arc<dyn ApprovalStepRepository>,
    history: Arc<dyn ApprovalHistoryRepository>,
    escalations: Arc<dyn EscalationLogRepository>,
    config_source: Arc<dyn CompanyConfigSource>,
    directory: Arc<dyn OrgDirectory>,
    notifications: Arc<dyn NotificationSink>,
}

impl StepProcessor {
    pub fn new(
        expenses: Arc<dyn ExpenseRepository>,
        steps: Arc<dyn ApprovalStepRepository>,
        history: Arc<dyn ApprovalHistoryRepository>,
        escalations: Arc<dyn EscalationLogRepository>,
        config_source: Arc<dyn CompanyConfigSource>,
        directory: Arc<dyn OrgDirectory>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { expenses, steps, history, escalations, config_source, directory, notifications }
    }

    pub async fn process_action(
        &self,
        step_id: &StepId,
        actor: &Actor,
        action: StepAction,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, WorkflowError> {
        let step = self
            .steps
            .find_by_id(step_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound { kind: "approval step", id: step_id.0.clone() })?;
        let expense = self
            .expenses
            .find_by_id(&step.expense_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound {
                kind: "expense",
                id: step.expense_id.0.clone(),
            })?;

        if expense.status != ExpenseStatus::Pending {
            return Err(WorkflowError::ExpenseAlreadyResolved {
                expense_id: expense.id.clone(),
                status: expense.status,
            });
        }

        self.authorize(&step, &expense, actor, action)?;

        let actionable = match action {
            StepAction::Approve | StepAction::Reject => step.is_actionable(),
            // Escalating an already-escalated step would double-escalate.
            StepAction::Escalate => step.status == StepStatus::Pending,
        };
        if !actionable {
            return Err(WorkflowError::InvalidStepState {
                step_id: step.id.clone(),
                status: step.status,
            });
        }

        // Only the lowest-order non-terminal step accepts actions.
        let chain = self.steps.list_for_expense(&step.expense_id).await?;
        if active_step(&chain).map(|active| &active.id) != Some(&step.id) {
            return Err(WorkflowError::InvalidStepState {
                step_id: step.id.clone(),
                status: step.status,
            });
        }

        match action {
            StepAction::Approve => self.approve(step, expense, chain, actor, comment, now).await,
            StepAction::Reject => self.reject(step, expense, actor, comment, now).await,
            StepAction::Escalate => self.escalate(step, expense, actor, comment, now).await,
        }
    }

    /// Admins get no implicit override here; bulk actions carry their own
    /// authorization and everything else goes through the assigned approver.
    fn authorize(
        &self,
        step: &ApprovalStep,
        expense: &Expense,
        actor: &Actor,
        action: StepAction,
    ) -> Result<(), WorkflowError> {
        match actor {
            Actor::System => match action {
                StepAction::Escalate => Ok(()),
                _ => Err(WorkflowError::UnauthorizedActor {
                    actor_id: crate::actor::SYSTEM_ACTOR_ID.to_string(),
                }),
            },
            Actor::User(identity) => {
                let permitted = identity.company_id == expense.company_id
                    && match action {
                        StepAction::Approve | StepAction::Reject => {
                            step.is_assigned_to(&identity.user_id)
                        }
                        StepAction::Escalate => step.approver_id == identity.user_id,
                    };
                if permitted {
                    Ok(())
                } else {
                    Err(WorkflowError::UnauthorizedActor {
                        actor_id: identity.user_id.0.clone(),
                    })
                }
            }
        }
    }

    async fn approve(
        &self,
        step: ApprovalStep,
        expense: Expense,
        chain: Vec<ApprovalStep>,
        actor: &Actor,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, WorkflowError> {
        let previous_status = step.status;
        let mut updated = step.clone();
        updated.status = StepStatus::Approved;
        updated.approved_at = Some(now);
        if comment.is_some() {
            updated.comments = comment.clone();
        }
        updated.updated_at = now;

        if !self.steps.update_if_status(&updated, previous_status).await? {
            return Err(WorkflowError::InvalidStepState {
                step_id: step.id.clone(),
                status: previous_status,
            });
        }
        if previous_status == StepStatus::Escalated {
            self.escalations.resolve_for_step(&updated.id, now).await?;
        }

        let is_final = chain.iter().all(|other| {
            other.id == updated.id
                || other.step_order < updated.step_order
                || other.status.is_terminal()
        });

        let mut resolved = expense.clone();
        if is_final {
            let transition = machine::transition(expense.status, ExpenseEvent::FinalStepApproved)?;
            resolved.status = transition.to;
            resolved.approved_by = actor.user_id().cloned();
            resolved.approved_at = Some(now);
            resolved.updated_at = now;
            if !self.expenses.update_if_status(&resolved, ExpenseStatus::Pending).await? {
                warn!(
                    event_name = "workflow.expense_resolution_lost",
                    expense_id = %expense.id.0,
                    "step approved but a concurrent action resolved the expense first"
                );
                return Err(WorkflowError::ExpenseAlreadyResolved {
                    expense_id: expense.id.clone(),
                    status: expense.status,
                });
            }
        }

        let mut row = ApprovalHistory::new(
            expense.id.clone(),
            HistoryAction::Approved,
            actor.actor_id(),
            now,
        )
        .with_status_change(previous_status.as_str(), StepStatus::Approved.as_str())
        .with_metadata("step_order", updated.step_order.to_string());
        if is_final {
            row = row.with_metadata("expense_status", resolved.status.as_str());
        }
        if let Some(comment) = &comment {
            row = row.with_comment(comment.clone());
        }
        self.history.append(row).await?;

        info!(
            event_name = "workflow.step_approved",
            expense_id = %expense.id.0,
            step_id = %updated.id.0,
            actor = actor.actor_id(),
            step_order = updated.step_order,
            chain_resolved = is_final,
            "approval step approved"
        );

        if is_final {
            deliver_best_effort(
                self.notifications.as_ref(),
                Notification::new(
                    expense.employee_id.clone(),
                    NotificationType::ExpenseApproved,
                    Some(expense.id.clone()),
                    Some(updated.id.clone()),
                ),
            )
            .await;
        } else if let Some(next) = chain
            .iter()
            .filter(|other| other.step_order > updated.step_order && !other.status.is_terminal())
            .min_by_key(|other| other.step_order)
        {
            deliver_best_effort(
                self.notifications.as_ref(),
                Notification::new(
                    next.approver_id.clone(),
                    NotificationType::ApprovalRequired,
                    Some(expense.id.clone()),
                    Some(next.id.clone()),
                ),
            )
            .await;
        }

        Ok(ActionOutcome { step: updated, expense: resolved })
    }

    async fn reject(
        &self,
        step: ApprovalStep,
        expense: Expense,
        actor: &Actor,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, WorkflowError> {
        let previous_status = step.status;
        let reason = comment.clone().unwrap_or_else(|| "rejected".to_string());

        let mut updated = step.clone();
        updated.status = StepStatus::Rejected;
        updated.rejected_at = Some(now);
        updated.rejection_reason = Some(reason.clone());
        updated.updated_at = now;

        if !self.steps.update_if_status(&updated, previous_status).await? {
            return Err(WorkflowError::InvalidStepState {
                step_id: step.id.clone(),
                status: previous_status,
            });
        }
        if previous_status == StepStatus::Escalated {
            self.escalations.resolve_for_step(&updated.id, now).await?;
        }

        // Short-circuit: the whole expense resolves now; later steps are
        // left untouched in pending.
        let transition = machine::transition(expense.status, ExpenseEvent::StepRejected)?;
        let mut resolved = expense.clone();
        resolved.status = transition.to;
        resolved.rejected_by = actor.user_id().cloned();
        resolved.rejected_at = Some(now);
        resolved.rejection_reason = Some(reason.clone());
        resolved.updated_at = now;
        if !self.expenses.update_if_status(&resolved, ExpenseStatus::Pending).await? {
            warn!(
                event_name = "workflow.expense_resolution_lost",
                expense_id = %expense.id.0,
                "step rejected but a concurrent action resolved the expense first"
            );
            return Err(WorkflowError::ExpenseAlreadyResolved {
                expense_id: expense.id.clone(),
                status: expense.status,
            });
        }

        self.history
            .append(
                ApprovalHistory::new(
                    expense.id.clone(),
                    HistoryAction::Rejected,
                    actor.actor_id(),
                    now,
                )
                .with_status_change(previous_status.as_str(), StepStatus::Rejected.as_str())
                .with_comment(reason)
                .with_metadata("step_order", updated.step_order.to_string())
                .with_metadata("expense_status", resolved.status.as_str()),
            )
            .await?;

        info!(
            event_name = "workflow.step_rejected",
            expense_id = %expense.id.0,
            step_id = %updated.id.0,
            actor = actor.actor_id(),
            step_order = updated.step_order,
            "approval step rejected; chain short-circuited"
        );

        deliver_best_effort(
            self.notifications.as_ref(),
            Notification::new(
                expense.employee_id.clone(),
                NotificationType::ExpenseRejected,
                Some(expense.id.clone()),
                Some(updated.id.clone()),
            ),
        )
        .await;

        Ok(ActionOutcome { step: updated, expense: resolved })
    }

    async fn escalate(
        &self,
        step: ApprovalStep,
        expense: Expense,
        actor: &Actor,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, WorkflowError> {
        let target = self.resolve_escalation_target(&step, &expense)?;
        let reason = comment.unwrap_or_else(|| "escalated".to_string());

        let mut updated = step.clone();
        updated.status = StepStatus::Escalated;
        updated.escalated_to = Some(target.clone());
        updated.escalated_at = Some(now);
        // Escalation reassigns authority; it does not grant more time.
        updated.updated_at = now;

        if !self.steps.update_if_status(&updated, StepStatus::Pending).await? {
            return Err(WorkflowError::InvalidStepState {
                step_id: step.id.clone(),
                status: step.status,
            });
        }

        self.escalations
            .append(EscalationLog::new(
                expense.id.clone(),
                updated.id.clone(),
                step.approver_id.clone(),
                target.clone(),
                reason.clone(),
                now,
            ))
            .await?;

        self.history
            .append(
                ApprovalHistory::new(
                    expense.id.clone(),
                    HistoryAction::Escalated,
                    actor.actor_id(),
                    now,
                )
                .with_status_change(StepStatus::Pending.as_str(), StepStatus::Escalated.as_str())
                .with_comment(reason)
                .with_metadata("from", step.approver_id.0.clone())
                .with_metadata("to", target.0.clone()),
            )
            .await?;

        info!(
            event_name = "workflow.step_escalated",
            expense_id = %expense.id.0,
            step_id = %updated.id.0,
            from = %step.approver_id.0,
            to = %target.0,
            actor = actor.actor_id(),
            "approval step escalated"
        );

        let target_notification = match actor {
            Actor::System => NotificationType::ApprovalOverdue,
            Actor::User(_) => NotificationType::ApprovalRequired,
        };
        deliver_best_effort(
            self.notifications.as_ref(),
            Notification::new(
                step.approver_id.clone(),
                NotificationType::ExpenseEscalated,
                Some(expense.id.clone()),
                Some(updated.id.clone()),
            ),
        )
        .await;
        deliver_best_effort(
            self.notifications.as_ref(),
            Notification::new(
                target,
                target_notification,
                Some(expense.id.clone()),
                Some(updated.id.clone()),
            ),
        )
        .await;

        Ok(ActionOutcome { step: updated, expense })
    }

    /// Configured target, else the approver's own manager, else the company
    /// admin. Nothing resolvable means the escalation cannot proceed.
    fn resolve_escalation_target(
        &self,
        step: &ApprovalStep,
        expense: &Expense,
    ) -> Result<UserId, WorkflowError> {
        let config = self.config_source.chain_config(&expense.company_id).unwrap_or_default();
        config
            .escalation_target
            .or_else(|| self.directory.manager_of(&step.approver_id))
            .or_else(|| self.directory.company_admin(&expense.company_id))
            .ok_or_else(|| {
                WorkflowError::Validation(format!(
                    "no escalation target resolvable for step {}",
                    step.id.0
                ))
            })
    }
}
