use chrono::{DateTime, Utc};
use sqlx::Row;

use spendflow_core::domain::bulk::{
    BulkAction, BulkItemError, BulkOperation, BulkOperationId, BulkStatus,
};
use spendflow_core::domain::expense::ExpenseId;
use spendflow_core::domain::identity::{CompanyId, UserId};

use super::{BulkOperationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlBulkOperationRepository {
    pool: DbPool,
}

impl SqlBulkOperationRepository {
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

fn parse_count(raw: i64, field: &str) -> Result<u32, RepositoryError> {
    u32::try_from(raw).map_err(|_| RepositoryError::Decode(format!("invalid {field} `{raw}`")))
}

fn row_to_operation(row: &sqlx::sqlite::SqliteRow) -> Result<BulkOperation, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let company_id: String = decode(row.try_get("company_id"))?;
    let approver_id: String = decode(row.try_get("approver_id"))?;
    let action_str: String = decode(row.try_get("action"))?;
    let status_str: String = decode(row.try_get("status"))?;
    let expense_ids_json: String = decode(row.try_get("expense_ids"))?;
    let comments: Option<String> = decode(row.try_get("comments"))?;
    let processed_count: i64 = decode(row.try_get("processed_count"))?;
    let success_count: i64 = decode(row.try_get("success_count"))?;
    let failure_count: i64 = decode(row.try_get("failure_count"))?;
    let error_log_json: String = decode(row.try_get("error_log"))?;
    let created_at: String = decode(row.try_get("created_at"))?;
    let completed_at: Option<String> = decode(row.try_get("completed_at"))?;

    let action = BulkAction::parse(&action_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown bulk action `{action_str}`")))?;
    let status = BulkStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown bulk status `{status_str}`")))?;

    let expense_ids: Vec<String> = serde_json::from_str(&expense_ids_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid expense_ids payload: {e}")))?;
    let errors: Vec<BulkItemError> = serde_json::from_str(&error_log_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid error_log payload: {e}")))?;

    Ok(BulkOperation {
        id: BulkOperationId(id),
        company_id: CompanyId(company_id),
        approver_id: UserId(approver_id),
        action,
        status,
        expense_ids: expense_ids.into_iter().map(ExpenseId).collect(),
        comments,
        processed_count: parse_count(processed_count, "processed_count")?,
        success_count: parse_count(success_count, "success_count")?,
        failure_count: parse_count(failure_count, "failure_count")?,
        errors,
        created_at: parse_datetime(&created_at)?,
        completed_at: completed_at.map(|value| parse_datetime(&value)).transpose()?,
    })
}

#[async_trait::async_trait]
impl BulkOperationRepository for SqlBulkOperationRepository {
    async fn find_by_id(
        &self,
        id: &BulkOperationId,
    ) -> Result<Option<BulkOperation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, approver_id, action, status, expense_ids, comments,
                    processed_count, success_count, failure_count, error_log,
                    created_at, completed_at
             FROM bulk_operation WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_operation(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, operation: BulkOperation) -> Result<(), RepositoryError> {
        let expense_ids: Vec<&str> =
            operation.expense_ids.iter().map(|id| id.0.as_str()).collect();
        let expense_ids_json = serde_json::to_string(&expense_ids)
            .map_err(|e| RepositoryError::Decode(format!("encode expense_ids: {e}")))?;
        let error_log_json = serde_json::to_string(&operation.errors)
            .map_err(|e| RepositoryError::Decode(format!("encode error_log: {e}")))?;

        sqlx::query(
            "INSERT INTO bulk_operation (id, company_id, approver_id, action, status, expense_ids,
                                         comments, processed_count, success_count, failure_count,
                                         error_log, created_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 processed_count = excluded.processed_count,
                 success_count = excluded.success_count,
                 failure_count = excluded.failure_count,
                 error_log = excluded.error_log,
                 completed_at = excluded.completed_at",
        )
        .bind(&operation.id.0)
        .bind(&operation.company_id.0)
        .bind(&operation.approver_id.0)
        .bind(operation.action.as_str())
        .bind(operation.status.as_str())
        .bind(expense_ids_json)
        .bind(&operation.comments)
        .bind(i64::from(operation.processed_count))
        .bind(i64::from(operation.success_count))
        .bind(i64::from(operation.failure_count))
        .bind(error_log_json)
        .bind(operation.created_at.to_rfc3339())
        .bind(operation.completed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
