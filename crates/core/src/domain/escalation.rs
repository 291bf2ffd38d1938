use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::expense::ExpenseId;
use crate::domain::identity::UserId;
use crate::domain::step::StepId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscalationId(pub String);

/// Append-only record of a decision-authority handoff. `resolved_at` is the
/// only field written after creation, once the escalated step reaches a
/// terminal status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationLog {
    pub id: EscalationId,
    pub expense_id: ExpenseId,
    pub step_id: StepId,
    pub from_approver: UserId,
    pub to_approver: UserId,
    pub reason: String,
    pub escalated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EscalationLog {
    pub fn new(
        expense_id: ExpenseId,
        step_id: StepId,
        from_approver: UserId,
        to_approver: UserId,
        reason: impl Into<String>,
        escalated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EscalationId(Uuid::new_v4().to_string()),
            expense_id,
            step_id,
            from_approver,
            to_approver,
            reason: reason.into(),
            escalated_at,
            resolved_at: None,
        }
    }
}
