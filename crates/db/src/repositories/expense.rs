use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use spendflow_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use spendflow_core::domain::identity::{CompanyId, UserId};
use spendflow_core::visibility::ExpenseScope;

use super::{ExpenseRepository, RepositoryError};
use crate::DbPool;

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const EXPENSE_COLUMNS: &str = "id, employee_id, company_id, amount, currency, category, \
     description, status, approved_by, approved_at, rejected_by, rejected_at, \
     rejection_reason, created_at, updated_at";

fn decode<T>(value: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    value.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn parse_opt_datetime(raw: Option<String>) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|value| parse_datetime(&value)).transpose()
}

fn row_to_expense(row: &sqlx::sqlite::SqliteRow) -> Result<Expense, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let employee_id: String = decode(row.try_get("employee_id"))?;
    let company_id: String = decode(row.try_get("company_id"))?;
    let amount_str: String = decode(row.try_get("amount"))?;
    let currency: String = decode(row.try_get("currency"))?;
    let category: String = decode(row.try_get("category"))?;
    let description: String = decode(row.try_get("description"))?;
    let status_str: String = decode(row.try_get("status"))?;
    let approved_by: Option<String> = decode(row.try_get("approved_by"))?;
    let approved_at: Option<String> = decode(row.try_get("approved_at"))?;
    let rejected_by: Option<String> = decode(row.try_get("rejected_by"))?;
    let rejected_at: Option<String> = decode(row.try_get("rejected_at"))?;
    let rejection_reason: Option<String> = decode(row.try_get("rejection_reason"))?;
    let created_at: String = decode(row.try_get("created_at"))?;
    let updated_at: String = decode(row.try_get("updated_at"))?;

    let amount = Decimal::from_str(&amount_str)
        .map_err(|e| RepositoryError::Decode(format!("invalid amount `{amount_str}`: {e}")))?;
    let status = ExpenseStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown expense status `{status_str}`")))?;

    Ok(Expense {
        id: ExpenseId(id),
        employee_id: UserId(employee_id),
        company_id: CompanyId(company_id),
        amount,
        currency,
        category,
        description,
        status,
        approved_by: approved_by.map(UserId),
        approved_at: parse_opt_datetime(approved_at)?,
        rejected_by: rejected_by.map(UserId),
        rejected_at: parse_opt_datetime(rejected_at)?,
        rejection_reason,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EXPENSE_COLUMNS} FROM expense WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_expense(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO expense (id, employee_id, company_id, amount, currency, category,
                                  description, status, approved_by, approved_at, rejected_by,
                                  rejected_at, rejection_reason, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 amount = excluded.amount,
                 currency = excluded.currency,
                 category = excluded.category,
                 description = excluded.description,
                 status = excluded.status,
                 approved_by = excluded.approved_by,
                 approved_at = excluded.approved_at,
                 rejected_by = excluded.rejected_by,
                 rejected_at = excluded.rejected_at,
                 rejection_reason = excluded.rejection_reason,
                 updated_at = excluded.updated_at",
        )
        .bind(&expense.id.0)
        .bind(&expense.employee_id.0)
        .bind(&expense.company_id.0)
        .bind(expense.amount.to_string())
        .bind(&expense.currency)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.status.as_str())
        .bind(expense.approved_by.as_ref().map(|u| u.0.clone()))
        .bind(expense.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(expense.rejected_by.as_ref().map(|u| u.0.clone()))
        .bind(expense.rejected_at.map(|dt| dt.to_rfc3339()))
        .bind(&expense.rejection_reason)
        .bind(expense.created_at.to_rfc3339())
        .bind(expense.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_if_status(
        &self,
        expense: &Expense,
        expected: ExpenseStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE expense SET
                 status = ?,
                 approved_by = ?,
                 approved_at = ?,
                 rejected_by = ?,
                 rejected_at = ?,
                 rejection_reason = ?,
                 updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(expense.status.as_str())
        .bind(expense.approved_by.as_ref().map(|u| u.0.clone()))
        .bind(expense.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(expense.rejected_by.as_ref().map(|u| u.0.clone()))
        .bind(expense.rejected_at.map(|dt| dt.to_rfc3339()))
        .bind(&expense.rejection_reason)
        .bind(expense.updated_at.to_rfc3339())
        .bind(&expense.id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_visible(
        &self,
        scope: &ExpenseScope,
        limit: u32,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = match scope.employee_ids() {
            None => {
                sqlx::query(&format!(
                    "SELECT {EXPENSE_COLUMNS} FROM expense
                     WHERE company_id = ?
                     ORDER BY created_at DESC
                     LIMIT ?"
                ))
                .bind(&scope.company_id().0)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            Some(employee_ids) => {
                let placeholders =
                    employee_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
                let sql = format!(
                    "SELECT {EXPENSE_COLUMNS} FROM expense
                     WHERE company_id = ? AND employee_id IN ({placeholders})
                     ORDER BY created_at DESC
                     LIMIT ?"
                );
                let mut query = sqlx::query(&sql).bind(&scope.company_id().0);
                for employee_id in &employee_ids {
                    query = query.bind(&employee_id.0);
                }
                query.bind(limit).fetch_all(&self.pool).await?
            }
        };

        rows.iter().map(row_to_expense).collect::<Result<Vec<_>, _>>()
    }
}
