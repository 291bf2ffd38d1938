use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::identity::{CompanyId, UserId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

/// Smallest amount the engine accepts for a submitted expense.
pub const MIN_EXPENSE_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Draft,
    Submitted,
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub employee_id: UserId,
    pub company_id: CompanyId,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub status: ExpenseStatus,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn is_resolved(&self) -> bool {
        self.status.is_terminal()
    }

    /// Input validation applied before any mutation on submission.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.amount < MIN_EXPENSE_AMOUNT {
            return Err(DomainError::Validation(format!(
                "expense amount {} is below the minimum of {MIN_EXPENSE_AMOUNT}",
                self.amount
            )));
        }
        if self.employee_id.0.trim().is_empty() {
            return Err(DomainError::Validation("expense has no owning employee".to_string()));
        }
        if self.company_id.0.trim().is_empty() {
            return Err(DomainError::Validation("expense has no owning company".to_string()));
        }
        if self.category.trim().is_empty() {
            return Err(DomainError::Validation("expense category is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{Expense, ExpenseId, ExpenseStatus, MIN_EXPENSE_AMOUNT};
    use crate::domain::identity::{CompanyId, UserId};

    fn expense(amount: Decimal) -> Expense {
        let now = Utc::now();
        Expense {
            id: ExpenseId("EXP-2026-001".to_string()),
            employee_id: UserId("u-employee".to_string()),
            company_id: CompanyId("c-acme".to_string()),
            amount,
            currency: "USD".to_string(),
            category: "travel".to_string(),
            description: "Taxi from airport".to_string(),
            status: ExpenseStatus::Draft,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_round_trips_from_storage_encoding() {
        let cases = [
            ExpenseStatus::Draft,
            ExpenseStatus::Submitted,
            ExpenseStatus::Pending,
            ExpenseStatus::Approved,
            ExpenseStatus::Rejected,
            ExpenseStatus::Cancelled,
        ];

        for status in cases {
            assert_eq!(ExpenseStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn terminal_statuses_are_resolved() {
        assert!(!ExpenseStatus::Pending.is_terminal());
        assert!(!ExpenseStatus::Submitted.is_terminal());
        assert!(ExpenseStatus::Approved.is_terminal());
        assert!(ExpenseStatus::Rejected.is_terminal());
        assert!(ExpenseStatus::Cancelled.is_terminal());
    }

    #[test]
    fn validation_rejects_amount_below_minimum() {
        assert!(expense(Decimal::new(1, 2)).validate().is_ok());
        assert!(expense(Decimal::ZERO).validate().is_err());
        assert!(expense(Decimal::new(-500, 2)).validate().is_err());
        assert_eq!(MIN_EXPENSE_AMOUNT, Decimal::new(1, 2));
    }

    #[test]
    fn validation_rejects_missing_category() {
        let mut invalid = expense(Decimal::new(2500, 2));
        invalid.category = "  ".to_string();
        assert!(invalid.validate().is_err());
    }
}
