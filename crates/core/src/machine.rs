use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::expense::ExpenseStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseEvent {
    Submit,
    ChainBuilt,
    AutoApproved,
    FinalStepApproved,
    StepRejected,
    Cancel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseTransition {
    pub from: ExpenseStatus,
    pub to: ExpenseStatus,
    pub event: ExpenseEvent,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExpenseTransitionError {
    #[error("invalid expense transition from {from:?} using event {event:?}")]
    InvalidTransition { from: ExpenseStatus, event: ExpenseEvent },
}

/// The only legal edges for expense-level status. Everything that mutates an
/// expense status goes through here; there is deliberately no Reopen edge
/// out of a terminal status.
pub fn transition(
    current: ExpenseStatus,
    event: ExpenseEvent,
) -> Result<ExpenseTransition, ExpenseTransitionError> {
    use ExpenseEvent::{AutoApproved, Cancel, ChainBuilt, FinalStepApproved, StepRejected, Submit};
    use ExpenseStatus::{Approved, Cancelled, Draft, Pending, Rejected, Submitted};

    let to = match (current, event) {
        (Draft, Submit) => Submitted,
        (Submitted, ChainBuilt) => Pending,
        (Submitted, AutoApproved) => Approved,
        (Pending, FinalStepApproved) => Approved,
        (Pending, StepRejected) => Rejected,
        (Pending | Submitted, Cancel) => Cancelled,
        _ => return Err(ExpenseTransitionError::InvalidTransition { from: current, event }),
    };

    Ok(ExpenseTransition { from: current, to, event })
}
