use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use spendflow_core::domain::bulk::{BulkAction, BulkOperation, BulkStatus};
use spendflow_core::domain::expense::ExpenseId;
use spendflow_core::domain::identity::Identity;
use spendflow_core::domain::step::active_step;
use spendflow_db::{ApprovalStepRepository, BulkOperationRepository};

use crate::actor::Actor;
use crate::errors::WorkflowError;
use crate::notify::{deliver_best_effort, Notification, NotificationSink, NotificationType};
use crate::processor::{StepAction, StepProcessor};

#[derive(Clone, Debug)]
pub struct BulkRequest {
    pub approver: Identity,
    pub action: BulkAction,
    pub expense_ids: Vec<ExpenseId>,
    pub comments: Option<String>,
}

/// Applies one approve/reject action across a batch of expenses for a
/// single approver. Items are processed sequentially; counters live on the
/// batch record and are only touched here, never by the processor.
pub struct BulkCoordinator {
    steps: Arc<dyn ApprovalStepRepository>,
    bulk_operations: Arc<dyn BulkOperationRepository>,
    processor: Arc<StepProcessor>,
    notifications: Arc<dyn NotificationSink>,
}

impl BulkCoordinator {
    pub fn new(
        steps: Arc<dyn ApprovalStepRepository>,
        bulk_operations: Arc<dyn BulkOperationRepository>,
        processor: Arc<StepProcessor>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { steps, bulk_operations, processor, notifications }
    }

    pub async fn execute(
        &self,
        request: BulkRequest,
        now: DateTime<Utc>,
    ) -> Result<BulkOperation, WorkflowError> {
        let mut operation = BulkOperation::new(
            request.approver.company_id.clone(),
            request.approver.user_id.clone(),
            request.action,
            request.expense_ids.clone(),
            request.comments.clone(),
            now,
        );
        self.bulk_operations.save(operation.clone()).await?;

        operation.status = BulkStatus::Processing;
        self.bulk_operations.save(operation.clone()).await?;

        let action = match request.action {
            BulkAction::Approve => StepAction::Approve,
            BulkAction::Reject => StepAction::Reject,
        };
        let actor = Actor::User(request.approver.clone());

        let expense_ids = operation.expense_ids.clone();
        for expense_id in &expense_ids {
            match self.process_item(expense_id, &actor, &request, action, now).await {
                Ok(()) => operation.record_success(),
                Err(error) => {
                    warn!(
                        event_name = "workflow.bulk_item_failed",
                        operation_id = %operation.id.0,
                        expense_id = %expense_id.0,
                        error = %error,
                        "bulk item failed; continuing batch"
                    );
                    operation.record_failure(expense_id.clone(), error.to_string());
                }
            }

            // Persist progress after every item; if the store itself goes
            // away mid-batch that is the one systemic failure mode.
            if let Err(save_error) = self.bulk_operations.save(operation.clone()).await {
                operation.status = BulkStatus::Failed;
                let _ = self.bulk_operations.save(operation.clone()).await;
                return Err(save_error.into());
            }
        }

        operation.status = BulkStatus::Completed;
        operation.completed_at = Some(now);
        self.bulk_operations.save(operation.clone()).await?;

        info!(
            event_name = "workflow.bulk_completed",
            operation_id = %operation.id.0,
            processed = operation.processed_count,
            succeeded = operation.success_count,
            failed = operation.failure_count,
            "bulk operation completed"
        );

        deliver_best_effort(
            self.notifications.as_ref(),
            Notification::new(
                operation.approver_id.clone(),
                NotificationType::BulkCompleted,
                None,
                None,
            ),
        )
        .await;

        Ok(operation)
    }

    /// The item's actionable step must exist and belong to the requesting
    /// approver; anything else is a per-item failure, never a batch abort.
    async fn process_item(
        &self,
        expense_id: &ExpenseId,
        actor: &Actor,
        request: &BulkRequest,
        action: StepAction,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let chain = self.steps.list_for_expense(expense_id).await?;
        let active = active_step(&chain).ok_or_else(|| WorkflowError::NotFound {
            kind: "actionable approval step",
            id: expense_id.0.clone(),
        })?;

        if !active.is_assigned_to(&request.approver.user_id) {
            return Err(WorkflowError::UnauthorizedActor {
                actor_id: request.approver.user_id.0.clone(),
            });
        }

        self.processor
            .process_action(&active.id, actor, action, request.comments.clone(), now)
            .await
            .map(|_| ())
    }
}
