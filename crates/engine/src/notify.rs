use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use spendflow_core::domain::expense::ExpenseId;
use spendflow_core::domain::identity::UserId;
use spendflow_core::domain::step::StepId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ExpenseSubmitted,
    ExpenseApproved,
    ExpenseRejected,
    ExpenseEscalated,
    ApprovalRequired,
    ApprovalOverdue,
    BulkCompleted,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExpenseSubmitted => "expense_submitted",
            Self::ExpenseApproved => "expense_approved",
            Self::ExpenseRejected => "expense_rejected",
            Self::ExpenseEscalated => "expense_escalated",
            Self::ApprovalRequired => "approval_required",
            Self::ApprovalOverdue => "approval_overdue",
            Self::BulkCompleted => "bulk_completed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: UserId,
    pub notification_type: NotificationType,
    pub expense_id: Option<ExpenseId>,
    pub step_id: Option<StepId>,
}

impl Notification {
    pub fn new(
        recipient_id: UserId,
        notification_type: NotificationType,
        expense_id: Option<ExpenseId>,
        step_id: Option<StepId>,
    ) -> Self {
        Self { recipient_id, notification_type, expense_id, step_id }
    }
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotificationError(pub String);

/// Outbound notification seam. Delivery and retry are the sink's problem;
/// the engine fires and forgets.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    delivered: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn delivered(&self) -> Vec<Notification> {
        match self.delivered.lock() {
            Ok(delivered) => delivered.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn deliver(&self, notification: Notification) -> Result<(), NotificationError> {
        match self.delivered.lock() {
            Ok(mut delivered) => delivered.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

/// A sink failure must never fail or roll back the workflow action it rode
/// along with; it is logged and swallowed here.
pub(crate) async fn deliver_best_effort(sink: &dyn NotificationSink, notification: Notification) {
    let notification_type = notification.notification_type;
    if let Err(error) = sink.deliver(notification).await {
        warn!(
            event_name = "notification.delivery_failed",
            notification_type = notification_type.as_str(),
            error = %error,
            "notification delivery failed; continuing"
        );
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::{
        deliver_best_effort, InMemoryNotificationSink, Notification, NotificationError,
        NotificationSink, NotificationType,
    };
    use spendflow_core::domain::identity::UserId;

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn deliver(&self, _notification: Notification) -> Result<(), NotificationError> {
            Err(NotificationError("sink unreachable".to_string()))
        }
    }

    fn notification() -> Notification {
        Notification::new(
            UserId("u-emp".to_string()),
            NotificationType::ExpenseApproved,
            None,
            None,
        )
    }

    #[tokio::test]
    async fn sink_failures_are_swallowed() {
        // Must not panic or propagate.
        deliver_best_effort(&FailingSink, notification()).await;
    }

    #[tokio::test]
    async fn in_memory_sink_records_deliveries() {
        let sink = InMemoryNotificationSink::default();
        deliver_best_effort(&sink, notification()).await;

        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].notification_type, NotificationType::ExpenseApproved);
    }
}
