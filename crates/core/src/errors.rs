use thiserror::Error;

use crate::chain::ChainBuildError;
use crate::machine::ExpenseTransitionError;

/// Domain-level failures. Everything here is rejected before any mutation
/// is applied.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Transition(#[from] ExpenseTransitionError),
    #[error(transparent)]
    ChainBuild(#[from] ChainBuildError),
    #[error("validation failed: {0}")]
    Validation(String),
}
