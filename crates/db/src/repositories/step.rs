use chrono::{DateTime, Utc};
use sqlx::Row;

use spendflow_core::domain::expense::ExpenseId;
use spendflow_core::domain::identity::{CompanyId, UserId};
use spendflow_core::domain::step::{ApprovalStep, StepId, StepStatus};

use super::{ApprovalStepRepository, RepositoryError};
use crate::DbPool;

pub struct SqlApprovalStepRepository {
    pool: DbPool,
}

impl SqlApprovalStepRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const STEP_COLUMNS: &str = "id, expense_id, step_order, approver_id, status, due_date, \
     approved_at, rejected_at, comments, rejection_reason, escalated_to, escalated_at, \
     created_at, updated_at";

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

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let expense_id: String = decode(row.try_get("expense_id"))?;
    let step_order: i64 = decode(row.try_get("step_order"))?;
    let approver_id: String = decode(row.try_get("approver_id"))?;
    let status_str: String = decode(row.try_get("status"))?;
    let due_date: String = decode(row.try_get("due_date"))?;
    let approved_at: Option<String> = decode(row.try_get("approved_at"))?;
    let rejected_at: Option<String> = decode(row.try_get("rejected_at"))?;
    let comments: Option<String> = decode(row.try_get("comments"))?;
    let rejection_reason: Option<String> = decode(row.try_get("rejection_reason"))?;
    let escalated_to: Option<String> = decode(row.try_get("escalated_to"))?;
    let escalated_at: Option<String> = decode(row.try_get("escalated_at"))?;
    let created_at: String = decode(row.try_get("created_at"))?;
    let updated_at: String = decode(row.try_get("updated_at"))?;

    let status = StepStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{status_str}`")))?;
    let step_order = u32::try_from(step_order)
        .map_err(|_| RepositoryError::Decode(format!("invalid step_order `{step_order}`")))?;

    Ok(ApprovalStep {
        id: StepId(id),
        expense_id: ExpenseId(expense_id),
        step_order,
        approver_id: UserId(approver_id),
        status,
        due_date: parse_datetime(&due_date)?,
        approved_at: parse_opt_datetime(approved_at)?,
        rejected_at: parse_opt_datetime(rejected_at)?,
        comments,
        rejection_reason,
        escalated_to: escalated_to.map(UserId),
        escalated_at: parse_opt_datetime(escalated_at)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl ApprovalStepRepository for SqlApprovalStepRepository {
    async fn find_by_id(&self, id: &StepId) -> Result<Option<ApprovalStep>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM approval_step WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_step(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, step: ApprovalStep) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval_step (id, expense_id, step_order, approver_id, status, due_date,
                                        approved_at, rejected_at, comments, rejection_reason,
                                        escalated_to, escalated_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 due_date = excluded.due_date,
                 approved_at = excluded.approved_at,
                 rejected_at = excluded.rejected_at,
                 comments = excluded.comments,
                 rejection_reason = excluded.rejection_reason,
                 escalated_to = excluded.escalated_to,
                 escalated_at = excluded.escalated_at,
                 updated_at = excluded.updated_at",
        )
        .bind(&step.id.0)
        .bind(&step.expense_id.0)
        .bind(i64::from(step.step_order))
        .bind(&step.approver_id.0)
        .bind(step.status.as_str())
        .bind(step.due_date.to_rfc3339())
        .bind(step.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(step.rejected_at.map(|dt| dt.to_rfc3339()))
        .bind(&step.comments)
        .bind(&step.rejection_reason)
        .bind(step.escalated_to.as_ref().map(|u| u.0.clone()))
        .bind(step.escalated_at.map(|dt| dt.to_rfc3339()))
        .bind(step.created_at.to_rfc3339())
        .bind(step.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM approval_step
             WHERE expense_id = ?
             ORDER BY step_order ASC"
        ))
        .bind(&expense_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()
    }

    async fn update_if_status(
        &self,
        step: &ApprovalStep,
        expected: StepStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE approval_step SET
                 status = ?,
                 approved_at = ?,
                 rejected_at = ?,
                 comments = ?,
                 rejection_reason = ?,
                 escalated_to = ?,
                 escalated_at = ?,
                 updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(step.status.as_str())
        .bind(step.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(step.rejected_at.map(|dt| dt.to_rfc3339()))
        .bind(&step.comments)
        .bind(&step.rejection_reason)
        .bind(step.escalated_to.as_ref().map(|u| u.0.clone()))
        .bind(step.escalated_at.map(|dt| dt.to_rfc3339()))
        .bind(step.updated_at.to_rfc3339())
        .bind(&step.id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_overdue(
        &self,
        company_id: Option<&CompanyId>,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let columns = STEP_COLUMNS
            .split(", ")
            .map(|column| format!("s.{column}"))
            .collect::<Vec<_>>()
            .join(", ");

        let rows: Vec<sqlx::sqlite::SqliteRow> = if let Some(company) = company_id {
            sqlx::query(&format!(
                "SELECT {columns} FROM approval_step s
                 JOIN expense e ON e.id = s.expense_id
                 WHERE s.status = 'pending' AND s.due_date < ? AND e.company_id = ?
                 ORDER BY s.due_date ASC
                 LIMIT ?"
            ))
            .bind(now.to_rfc3339())
            .bind(&company.0)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {columns} FROM approval_step s
                 WHERE s.status = 'pending' AND s.due_date < ?
                 ORDER BY s.due_date ASC
                 LIMIT ?"
            ))
            .bind(now.to_rfc3339())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()
    }
}
