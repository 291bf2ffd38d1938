use chrono::{DateTime, Utc};
use sqlx::Row;

use spendflow_core::domain::expense::ExpenseId;
use spendflow_core::domain::history::{ApprovalHistory, HistoryAction, HistoryId};

use super::{ApprovalHistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlApprovalHistoryRepository {
    pool: DbPool,
}

impl SqlApprovalHistoryRepository {
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

fn row_to_history(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalHistory, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let expense_id: String = decode(row.try_get("expense_id"))?;
    let action_str: String = decode(row.try_get("action"))?;
    let actor_id: String = decode(row.try_get("actor_id"))?;
    let old_status: Option<String> = decode(row.try_get("old_status"))?;
    let new_status: Option<String> = decode(row.try_get("new_status"))?;
    let comments: Option<String> = decode(row.try_get("comments"))?;
    let metadata: String = decode(row.try_get("metadata"))?;
    let occurred_at: String = decode(row.try_get("occurred_at"))?;

    let action = HistoryAction::parse(&action_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown history action `{action_str}`")))?;

    Ok(ApprovalHistory {
        id: HistoryId(id),
        expense_id: ExpenseId(expense_id),
        action,
        actor_id,
        old_status,
        new_status,
        comments,
        metadata: ApprovalHistory::metadata_from_json(&metadata),
        occurred_at: parse_datetime(&occurred_at)?,
    })
}

#[async_trait::async_trait]
impl ApprovalHistoryRepository for SqlApprovalHistoryRepository {
    /// Plain INSERT, no upsert: history rows are write-once.
    async fn append(&self, entry: ApprovalHistory) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval_history (id, expense_id, action, actor_id, old_status,
                                           new_status, comments, metadata, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id.0)
        .bind(&entry.expense_id.0)
        .bind(entry.action.as_str())
        .bind(&entry.actor_id)
        .bind(&entry.old_status)
        .bind(&entry.new_status)
        .bind(&entry.comments)
        .bind(entry.metadata_json())
        .bind(entry.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<ApprovalHistory>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, expense_id, action, actor_id, old_status, new_status, comments,
                    metadata, occurred_at
             FROM approval_history
             WHERE expense_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(&expense_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_history).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use spendflow_core::domain::expense::ExpenseId;
    use spendflow_core::domain::history::{ApprovalHistory, HistoryAction};

    use super::SqlApprovalHistoryRepository;
    use crate::repositories::ApprovalHistoryRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn appended_rows_come_back_as_a_timeline() {
        let repo = SqlApprovalHistoryRepository::new(setup().await);
        let expense_id = ExpenseId("E1".to_string());
        let base = Utc::now();

        let submitted = ApprovalHistory::new(
            expense_id.clone(),
            HistoryAction::Submitted,
            "u-emp",
            base,
        )
        .with_status_change("draft", "submitted");
        let approved = ApprovalHistory::new(
            expense_id.clone(),
            HistoryAction::Approved,
            "u-mgr",
            base + Duration::minutes(5),
        )
        .with_status_change("pending", "approved")
        .with_metadata("step_order", "1");

        repo.append(submitted).await.expect("append submitted");
        repo.append(approved).await.expect("append approved");

        let timeline = repo.list_for_expense(&expense_id).await.expect("list");
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].action, HistoryAction::Submitted);
        assert_eq!(timeline[1].action, HistoryAction::Approved);
        assert_eq!(timeline[1].metadata.get("step_order").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn history_survives_without_a_parent_expense_row() {
        // Audit rows have no FK; purging an expense must not orphan-fail them.
        let repo = SqlApprovalHistoryRepository::new(setup().await);
        let entry = ApprovalHistory::new(
            ExpenseId("E-purged".to_string()),
            HistoryAction::Cancelled,
            "u-admin",
            Utc::now(),
        );

        repo.append(entry).await.expect("append without parent");
        let rows =
            repo.list_for_expense(&ExpenseId("E-purged".to_string())).await.expect("list");
        assert_eq!(rows.len(), 1);
    }
}
