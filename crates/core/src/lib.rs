pub mod chain;
pub mod config;
pub mod domain;
pub mod errors;
pub mod machine;
pub mod visibility;

pub use chain::{
    ApprovalChainConfig, ApprovalRule, ApproverRequirement, ChainBuildError, ChainBuilder,
    CompanyConfigSource, InMemoryCompanyConfigSource, InMemoryOrgDirectory, OrgDirectory,
    PlannedStep,
};
pub use domain::bulk::{
    BulkAction, BulkItemError, BulkOperation, BulkOperationId, BulkStatus,
};
pub use domain::escalation::{EscalationId, EscalationLog};
pub use domain::expense::{Expense, ExpenseId, ExpenseStatus, MIN_EXPENSE_AMOUNT};
pub use domain::history::{ApprovalHistory, HistoryAction, HistoryId};
pub use domain::identity::{CompanyId, Identity, Role, UserId};
pub use domain::step::{active_step, ApprovalStep, StepId, StepStatus};
pub use errors::DomainError;
pub use machine::{transition, ExpenseEvent, ExpenseTransition, ExpenseTransitionError};
pub use visibility::{ExpenseScope, InMemorySubordinateDirectory, SubordinateDirectory};
