use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use spendflow_core::domain::bulk::{BulkOperation, BulkOperationId};
use spendflow_core::domain::escalation::EscalationLog;
use spendflow_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use spendflow_core::domain::history::ApprovalHistory;
use spendflow_core::domain::identity::CompanyId;
use spendflow_core::domain::step::{ApprovalStep, StepId, StepStatus};
use spendflow_core::visibility::ExpenseScope;

pub mod bulk;
pub mod escalation;
pub mod expense;
pub mod history;
pub mod memory;
pub mod step;

pub use bulk::SqlBulkOperationRepository;
pub use escalation::SqlEscalationLogRepository;
pub use expense::SqlExpenseRepository;
pub use history::SqlApprovalHistoryRepository;
pub use memory::InMemoryStore;
pub use step::SqlApprovalStepRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError>;

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError>;

    /// Writes the full row only when the stored status still equals
    /// `expected`. Returns false when another writer won the race.
    async fn update_if_status(
        &self,
        expense: &Expense,
        expected: ExpenseStatus,
    ) -> Result<bool, RepositoryError>;

    /// Scope-filtered listing, newest first. The scope predicate is the
    /// single source of visibility truth; callers never widen it.
    async fn list_visible(
        &self,
        scope: &ExpenseScope,
        limit: u32,
    ) -> Result<Vec<Expense>, RepositoryError>;
}

#[async_trait]
pub trait ApprovalStepRepository: Send + Sync {
    async fn find_by_id(&self, id: &StepId) -> Result<Option<ApprovalStep>, RepositoryError>;

    async fn save(&self, step: ApprovalStep) -> Result<(), RepositoryError>;

    /// Steps for one expense, ordered by `step_order` ascending.
    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<ApprovalStep>, RepositoryError>;

    /// Conditional update underpinning the one-winner concurrency rule.
    async fn update_if_status(
        &self,
        step: &ApprovalStep,
        expected: StepStatus,
    ) -> Result<bool, RepositoryError>;

    /// Pending steps past their due date, most overdue first.
    async fn list_overdue(
        &self,
        company_id: Option<&CompanyId>,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ApprovalStep>, RepositoryError>;
}

#[async_trait]
pub trait ApprovalHistoryRepository: Send + Sync {
    async fn append(&self, entry: ApprovalHistory) -> Result<(), RepositoryError>;

    /// Oldest first, so the rows read as a timeline.
    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<ApprovalHistory>, RepositoryError>;
}

#[async_trait]
pub trait EscalationLogRepository: Send + Sync {
    async fn append(&self, entry: EscalationLog) -> Result<(), RepositoryError>;

    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<EscalationLog>, RepositoryError>;

    /// Stamps `resolved_at` on every unresolved escalation of the step.
    async fn resolve_for_step(
        &self,
        step_id: &StepId,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BulkOperationRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &BulkOperationId,
    ) -> Result<Option<BulkOperation>, RepositoryError>;

    async fn save(&self, operation: BulkOperation) -> Result<(), RepositoryError>;
}
