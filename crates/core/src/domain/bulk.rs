use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::expense::ExpenseId;
use crate::domain::identity::{CompanyId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BulkOperationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Approve,
    Reject,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// `Failed` is reserved for a systemic error that stops the run before all
/// items were attempted; per-item failures still complete the batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BulkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemError {
    pub expense_id: ExpenseId,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOperation {
    pub id: BulkOperationId,
    pub company_id: CompanyId,
    pub approver_id: UserId,
    pub action: BulkAction,
    pub status: BulkStatus,
    pub expense_ids: Vec<ExpenseId>,
    pub comments: Option<String>,
    pub processed_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub errors: Vec<BulkItemError>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkOperation {
    pub fn new(
        company_id: CompanyId,
        approver_id: UserId,
        action: BulkAction,
        expense_ids: Vec<ExpenseId>,
        comments: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BulkOperationId(Uuid::new_v4().to_string()),
            company_id,
            approver_id,
            action,
            status: BulkStatus::Pending,
            expense_ids,
            comments,
            processed_count: 0,
            success_count: 0,
            failure_count: 0,
            errors: Vec::new(),
            created_at,
            completed_at: None,
        }
    }

    /// Counters are only ever advanced through these two methods so that
    /// `processed == success + failure` holds at every point in time.
    pub fn record_success(&mut self) {
        self.processed_count += 1;
        self.success_count += 1;
    }

    pub fn record_failure(&mut self, expense_id: ExpenseId, reason: impl Into<String>) {
        self.processed_count += 1;
        self.failure_count += 1;
        self.errors.push(BulkItemError { expense_id, reason: reason.into() });
    }

    pub fn all_items_attempted(&self) -> bool {
        self.processed_count as usize == self.expense_ids.len()
    }
}
