use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use spendflow_core::domain::bulk::{BulkOperation, BulkOperationId};
use spendflow_core::domain::escalation::EscalationLog;
use spendflow_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use spendflow_core::domain::history::ApprovalHistory;
use spendflow_core::domain::identity::CompanyId;
use spendflow_core::domain::step::{ApprovalStep, StepId, StepStatus};
use spendflow_core::visibility::ExpenseScope;

use super::{
    ApprovalHistoryRepository, ApprovalStepRepository, BulkOperationRepository,
    EscalationLogRepository, ExpenseRepository, RepositoryError,
};

/// One store backing every repository trait. A single struct (rather than
/// one per trait) because overdue-step scoping joins steps to their
/// expense's company, which needs both maps behind the same locks.
#[derive(Default)]
pub struct InMemoryStore {
    expenses: RwLock<HashMap<String, Expense>>,
    steps: RwLock<HashMap<String, ApprovalStep>>,
    history: RwLock<Vec<ApprovalHistory>>,
    escalations: RwLock<Vec<EscalationLog>>,
    bulk_operations: RwLock<HashMap<String, BulkOperation>>,
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryStore {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id.0).cloned())
    }

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.0.clone(), expense);
        Ok(())
    }

    async fn update_if_status(
        &self,
        expense: &Expense,
        expected: ExpenseStatus,
    ) -> Result<bool, RepositoryError> {
        let mut expenses = self.expenses.write().await;
        match expenses.get(&expense.id.0) {
            Some(current) if current.status == expected => {
                expenses.insert(expense.id.0.clone(), expense.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_visible(
        &self,
        scope: &ExpenseScope,
        limit: u32,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        let mut visible: Vec<Expense> = expenses
            .values()
            .filter(|expense| scope.permits(&expense.employee_id, &expense.company_id))
            .cloned()
            .collect();
        visible.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        visible.truncate(limit as usize);
        Ok(visible)
    }
}

#[async_trait::async_trait]
impl ApprovalStepRepository for InMemoryStore {
    async fn find_by_id(&self, id: &StepId) -> Result<Option<ApprovalStep>, RepositoryError> {
        let steps = self.steps.read().await;
        Ok(steps.get(&id.0).cloned())
    }

    async fn save(&self, step: ApprovalStep) -> Result<(), RepositoryError> {
        let mut steps = self.steps.write().await;
        steps.insert(step.id.0.clone(), step);
        Ok(())
    }

    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let steps = self.steps.read().await;
        let mut chain: Vec<ApprovalStep> =
            steps.values().filter(|step| &step.expense_id == expense_id).cloned().collect();
        chain.sort_by_key(|step| step.step_order);
        Ok(chain)
    }

    async fn update_if_status(
        &self,
        step: &ApprovalStep,
        expected: StepStatus,
    ) -> Result<bool, RepositoryError> {
        // The write lock makes check-then-write atomic, mirroring the SQL
        // `UPDATE ... WHERE status = ?` discipline.
        let mut steps = self.steps.write().await;
        match steps.get(&step.id.0) {
            Some(current) if current.status == expected => {
                steps.insert(step.id.0.clone(), step.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_overdue(
        &self,
        company_id: Option<&CompanyId>,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let steps = self.steps.read().await;
        let expenses = self.expenses.read().await;

        let mut overdue: Vec<ApprovalStep> = steps
            .values()
            .filter(|step| step.is_overdue(now))
            .filter(|step| match company_id {
                Some(company) => expenses
                    .get(&step.expense_id.0)
                    .is_some_and(|expense| &expense.company_id == company),
                None => true,
            })
            .cloned()
            .collect();
        overdue.sort_by(|left, right| left.due_date.cmp(&right.due_date));
        overdue.truncate(limit as usize);
        Ok(overdue)
    }
}

#[async_trait::async_trait]
impl ApprovalHistoryRepository for InMemoryStore {
    async fn append(&self, entry: ApprovalHistory) -> Result<(), RepositoryError> {
        let mut history = self.history.write().await;
        history.push(entry);
        Ok(())
    }

    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<ApprovalHistory>, RepositoryError> {
        let history = self.history.read().await;
        Ok(history.iter().filter(|entry| &entry.expense_id == expense_id).cloned().collect())
    }
}

#[async_trait::async_trait]
impl EscalationLogRepository for InMemoryStore {
    async fn append(&self, entry: EscalationLog) -> Result<(), RepositoryError> {
        let mut escalations = self.escalations.write().await;
        escalations.push(entry);
        Ok(())
    }

    async fn list_for_expense(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<EscalationLog>, RepositoryError> {
        let escalations = self.escalations.read().await;
        Ok(escalations.iter().filter(|entry| &entry.expense_id == expense_id).cloned().collect())
    }

    async fn resolve_for_step(
        &self,
        step_id: &StepId,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut escalations = self.escalations.write().await;
        for entry in escalations.iter_mut() {
            if &entry.step_id == step_id && entry.resolved_at.is_none() {
                entry.resolved_at = Some(resolved_at);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BulkOperationRepository for InMemoryStore {
    async fn find_by_id(
        &self,
        id: &BulkOperationId,
    ) -> Result<Option<BulkOperation>, RepositoryError> {
        let operations = self.bulk_operations.read().await;
        Ok(operations.get(&id.0).cloned())
    }

    async fn save(&self, operation: BulkOperation) -> Result<(), RepositoryError> {
        let mut operations = self.bulk_operations.write().await;
        operations.insert(operation.id.0.clone(), operation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use spendflow_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
    use spendflow_core::domain::identity::{CompanyId, UserId};
    use spendflow_core::domain::step::{ApprovalStep, StepId, StepStatus};

    use super::InMemoryStore;
    use crate::repositories::{ApprovalStepRepository, ExpenseRepository};

    fn expense(id: &str, company: &str) -> Expense {
        let now = Utc::now();
        Expense {
            id: ExpenseId(id.to_string()),
            employee_id: UserId("u-emp".to_string()),
            company_id: CompanyId(company.to_string()),
            amount: Decimal::new(5_000, 2),
            currency: "USD".to_string(),
            category: "meals".to_string(),
            description: String::new(),
            status: ExpenseStatus::Pending,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn step(id: &str, expense_id: &str, order: u32, overdue_hours: i64) -> ApprovalStep {
        let now = Utc::now();
        ApprovalStep {
            id: StepId(id.to_string()),
            expense_id: ExpenseId(expense_id.to_string()),
            step_order: order,
            approver_id: UserId("u-mgr".to_string()),
            status: StepStatus::Pending,
            due_date: now - Duration::hours(overdue_hours),
            approved_at: None,
            rejected_at: None,
            comments: None,
            rejection_reason: None,
            escalated_to: None,
            escalated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn conditional_step_update_has_exactly_one_winner() {
        let store = InMemoryStore::default();
        ApprovalStepRepository::save(&store, step("S1", "E1", 1, 0)).await.expect("save");

        let mut approved = step("S1", "E1", 1, 0);
        approved.status = StepStatus::Approved;

        let first = ApprovalStepRepository::update_if_status(&store, &approved, StepStatus::Pending)
            .await
            .expect("first");
        let second =
            ApprovalStepRepository::update_if_status(&store, &approved, StepStatus::Pending)
                .await
                .expect("second");

        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn overdue_listing_joins_company_through_the_expense() {
        let store = InMemoryStore::default();
        ExpenseRepository::save(&store, expense("E1", "c-1")).await.expect("save E1");
        ExpenseRepository::save(&store, expense("E2", "c-2")).await.expect("save E2");
        ApprovalStepRepository::save(&store, step("S1", "E1", 1, 10)).await.expect("save S1");
        ApprovalStepRepository::save(&store, step("S2", "E2", 1, 5)).await.expect("save S2");

        let scoped = store
            .list_overdue(Some(&CompanyId("c-1".to_string())), Utc::now(), 100)
            .await
            .expect("list");

        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id.0, "S1");
    }
}
