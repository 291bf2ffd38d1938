use chrono::{DateTime, Utc};
use sqlx::Row;

use spendflow_core::domain::escalation::{EscalationId, EscalationLog};
use spendflow_core::domain::expense::ExpenseId;
use spendflow_core::domain::identity::UserId;
use spendflow_core::domain::step::StepId;

use super::{EscalationLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEscalationLogRepository {
    pool: DbPool,
}

impl SqlEscalationLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(value: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    value.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn row_to_escalation(row: &sqlx::sqlite::SqliteRow) -> Result<EscalationLog, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let expense_id: String = decode(row.try_get("expense_id"))?;
    let step_id: String = decode(row.try_get("step_id"))?;
    let from_approver: String = decode(row.try_get("from_approver"))?;
    let to_approver: String = decode(row.try_get("to_approver"))?;
    let reason: String = decode(row.try_get("reason"))?;
    let escalated_at: String = decode(row.try_get("escalated_at"))?;
    let resolved_at: Option<String> = decode(row.try_get("resolved_at"))?;

    Ok(EscalationLog {
        id: EscalationId(id),
        expense_id: ExpenseId(expense_id),
        step_id: StepId(step_id),
        from_approver: UserId(from_approver),
        to_approver: UserId(to_approver),
        reason,
        escalated_at: parse_datetime(&escalated_at)?,
        resolved_at: resolved_at.map(|value| parse_datetime(&value)).transpose()?,
    })
}

#[async_trait::async_trait]
impl EscalationLogRepository for SqlEscalationLogRepository {
    async fn append(&self, entry: EscalationLog) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO escalation_log (id, expense_id, step_id, from_approver, to_approver,
                                         reason, escalated_at, resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id.0)
        .bind(&entry.expense_id.0)
        .bind(&entry.step_id.0)
        .bind(&entry.from_approver.0)
        .bind(&entry.to_approver.0)
        .bind(&entry.reason)
        .bind(entry.escalated_at.to_rfc3339())
        .bind(entry.resolved_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<EscalationLog>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, expense_id, step_id, from_approver, to_approver, reason,
                    escalated_at, resolved_at
             FROM escalation_log
             WHERE expense_id = ?
             ORDER BY escalated_at ASC, rowid ASC",
        )
        .bind(&expense_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_escalation).collect::<Result<Vec<_>, _>>()
    }

    async fn resolve_for_step(
        &self,
        step_id: &StepId,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE escalation_log SET resolved_at = ?
             WHERE step_id = ? AND resolved_at IS NULL",
        )
        .bind(resolved_at.to_rfc3339())
        .bind(&step_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
