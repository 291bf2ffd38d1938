use thiserror::Error;

use spendflow_core::chain::ChainBuildError;
use spendflow_core::domain::expense::{ExpenseId, ExpenseStatus};
use spendflow_core::domain::step::{StepId, StepStatus};
use spendflow_core::machine::ExpenseTransitionError;
use spendflow_db::RepositoryError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    ChainBuild(#[from] ChainBuildError),
    #[error(transparent)]
    Transition(#[from] ExpenseTransitionError),
    #[error("approval step {step_id:?} is not actionable from status {status:?}")]
    InvalidStepState { step_id: StepId, status: StepStatus },
    #[error("expense {expense_id:?} has already left pending with status {status:?}")]
    ExpenseAlreadyResolved { expense_id: ExpenseId, status: ExpenseStatus },
    #[error("actor `{actor_id}` is not authorized for this approval action")]
    UnauthorizedActor { actor_id: String },
    #[error("{kind} `{id}` was not found")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl WorkflowError {
    /// A conflict is the expected outcome of losing a concurrent race; the
    /// sweep and batch drivers treat it as a skip rather than a failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::InvalidStepState { .. } | Self::ExpenseAlreadyResolved { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::WorkflowError;
    use spendflow_core::domain::expense::{ExpenseId, ExpenseStatus};
    use spendflow_core::domain::step::{StepId, StepStatus};

    #[test]
    fn conflicts_are_distinguished_from_hard_failures() {
        let stale = WorkflowError::InvalidStepState {
            step_id: StepId("S1".to_string()),
            status: StepStatus::Approved,
        };
        let resolved = WorkflowError::ExpenseAlreadyResolved {
            expense_id: ExpenseId("E1".to_string()),
            status: ExpenseStatus::Rejected,
        };
        let unauthorized = WorkflowError::UnauthorizedActor { actor_id: "u-x".to_string() };

        assert!(stale.is_conflict());
        assert!(resolved.is_conflict());
        assert!(!unauthorized.is_conflict());
    }

    #[test]
    fn unauthorized_error_does_not_leak_step_fields() {
        let error = WorkflowError::UnauthorizedActor { actor_id: "u-x".to_string() };
        let message = error.to_string();

        assert!(message.contains("u-x"));
        assert!(!message.contains("step"), "permission failures must not describe the step");
    }
}
