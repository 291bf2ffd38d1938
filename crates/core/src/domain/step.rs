use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::expense::ExpenseId;
use crate::domain::identity::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
    Escalated,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Escalated => "escalated",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "escalated" => Some(Self::Escalated),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Escalated steps may still resolve; only these three are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

/// One link in an expense's approval chain. Steps are pre-created Pending by
/// the chain builder; which one is actionable is computed, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: StepId,
    pub expense_id: ExpenseId,
    pub step_order: u32,
    pub approver_id: UserId,
    pub status: StepStatus,
    pub due_date: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
    pub rejection_reason: Option<String>,
    pub escalated_to: Option<UserId>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalStep {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == StepStatus::Pending && now > self.due_date
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self.status, StepStatus::Pending | StepStatus::Escalated)
    }

    /// Whether `user` currently holds decision authority over this step.
    pub fn is_assigned_to(&self, user: &UserId) -> bool {
        if self.status == StepStatus::Escalated {
            return self.escalated_to.as_ref() == Some(user) || &self.approver_id == user;
        }
        &self.approver_id == user
    }
}

/// The active step of a chain: lowest `step_order` among non-terminal steps.
pub fn active_step(steps: &[ApprovalStep]) -> Option<&ApprovalStep> {
    steps
        .iter()
        .filter(|step| !step.status.is_terminal())
        .min_by_key(|step| step.step_order)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{active_step, ApprovalStep, StepId, StepStatus};
    use crate::domain::expense::ExpenseId;
    use crate::domain::identity::UserId;

    fn step(order: u32, status: StepStatus) -> ApprovalStep {
        let now = Utc::now();
        ApprovalStep {
            id: StepId(format!("step-{order}")),
            expense_id: ExpenseId("EXP-2026-001".to_string()),
            step_order: order,
            approver_id: UserId("u-manager".to_string()),
            status,
            due_date: now + Duration::hours(48),
            approved_at: None,
            rejected_at: None,
            comments: None,
            rejection_reason: None,
            escalated_to: None,
            escalated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_round_trips_from_storage_encoding() {
        let cases = [
            StepStatus::Pending,
            StepStatus::Approved,
            StepStatus::Rejected,
            StepStatus::Escalated,
            StepStatus::Cancelled,
        ];

        for status in cases {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn escalated_is_not_terminal() {
        assert!(!StepStatus::Escalated.is_terminal());
        assert!(StepStatus::Approved.is_terminal());
        assert!(StepStatus::Cancelled.is_terminal());
    }

    #[test]
    fn active_step_is_lowest_order_non_terminal() {
        let steps = vec![
            step(1, StepStatus::Approved),
            step(2, StepStatus::Pending),
            step(3, StepStatus::Pending),
        ];

        assert_eq!(active_step(&steps).map(|s| s.step_order), Some(2));
    }

    #[test]
    fn escalated_step_stays_active() {
        let steps = vec![step(1, StepStatus::Escalated), step(2, StepStatus::Pending)];
        assert_eq!(active_step(&steps).map(|s| s.step_order), Some(1));
    }

    #[test]
    fn fully_resolved_chain_has_no_active_step() {
        let steps = vec![step(1, StepStatus::Approved), step(2, StepStatus::Rejected)];
        assert_eq!(active_step(&steps), None);
    }

    #[test]
    fn overdue_requires_pending_status() {
        let now = Utc::now();
        let mut overdue = step(1, StepStatus::Pending);
        overdue.due_date = now - Duration::hours(1);
        assert!(overdue.is_overdue(now));

        let mut resolved = step(1, StepStatus::Approved);
        resolved.due_date = now - Duration::hours(1);
        assert!(!resolved.is_overdue(now));
    }

    #[test]
    fn escalated_step_accepts_both_original_and_target_approver() {
        let mut escalated = step(1, StepStatus::Escalated);
        escalated.escalated_to = Some(UserId("u-admin".to_string()));

        assert!(escalated.is_assigned_to(&UserId("u-manager".to_string())));
        assert!(escalated.is_assigned_to(&UserId("u-admin".to_string())));
        assert!(!escalated.is_assigned_to(&UserId("u-other".to_string())));
    }
}
