use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::expense::Expense;
use crate::domain::identity::{CompanyId, Role, UserId};

/// Org-chart lookups the chain builder needs. The surrounding application
/// owns the user store; this trait is the seam it plugs in through.
pub trait OrgDirectory: Send + Sync {
    fn manager_of(&self, user: &UserId) -> Option<UserId>;
    fn department_of(&self, user: &UserId) -> Option<String>;
    fn company_admin(&self, company: &CompanyId) -> Option<UserId>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryOrgDirectory {
    managers: HashMap<String, UserId>,
    departments: HashMap<String, String>,
    admins: HashMap<String, UserId>,
}

impl InMemoryOrgDirectory {
    pub fn with_manager(mut self, user: UserId, manager: UserId) -> Self {
        self.managers.insert(user.0, manager);
        self
    }

    pub fn with_department(mut self, user: UserId, department: impl Into<String>) -> Self {
        self.departments.insert(user.0, department.into());
        self
    }

    pub fn with_admin(mut self, company: CompanyId, admin: UserId) -> Self {
        self.admins.insert(company.0, admin);
        self
    }
}

impl OrgDirectory for InMemoryOrgDirectory {
    fn manager_of(&self, user: &UserId) -> Option<UserId> {
        self.managers.get(&user.0).cloned()
    }

    fn department_of(&self, user: &UserId) -> Option<String> {
        self.departments.get(&user.0).cloned()
    }

    fn company_admin(&self, company: &CompanyId) -> Option<UserId> {
        self.admins.get(&company.0).cloned()
    }
}

impl<T> OrgDirectory for std::sync::Arc<T>
where
    T: OrgDirectory + ?Sized,
{
    fn manager_of(&self, user: &UserId) -> Option<UserId> {
        (**self).manager_of(user)
    }

    fn department_of(&self, user: &UserId) -> Option<String> {
        (**self).department_of(user)
    }

    fn company_admin(&self, company: &CompanyId) -> Option<UserId> {
        (**self).company_admin(company)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproverRequirement {
    Role(Role),
    User(UserId),
}

/// Per-company approval configuration as supplied by the company settings
/// collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalChainConfig {
    pub required_approvals: Vec<ApproverRequirement>,
    pub escalation_hours: i64,
    pub escalation_target: Option<UserId>,
    pub auto_approve_under: Option<Decimal>,
}

impl Default for ApprovalChainConfig {
    fn default() -> Self {
        Self {
            required_approvals: vec![ApproverRequirement::Role(Role::Manager)],
            escalation_hours: 48,
            escalation_target: None,
            auto_approve_under: None,
        }
    }
}

/// A routing rule. All present criteria must hold for the rule to match;
/// among matches the highest priority wins, ties broken by name ascending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub id: String,
    pub name: String,
    pub priority: i32,
    pub category: Option<String>,
    pub department: Option<String>,
    pub employee_id: Option<UserId>,
    pub min_amount: Option<Decimal>,
    pub approver_id: Option<UserId>,
    pub escalation_hours: Option<i64>,
}

impl ApprovalRule {
    fn matches(&self, expense: &Expense, owner_department: Option<&str>) -> bool {
        if let Some(category) = &self.category {
            if normalize_key(category) != normalize_key(&expense.category) {
                return false;
            }
        }

        if let Some(department) = &self.department {
            match owner_department {
                Some(owner) if normalize_key(department) == normalize_key(owner) => {}
                _ => return false,
            }
        }

        if let Some(employee_id) = &self.employee_id {
            if employee_id != &expense.employee_id {
                return false;
            }
        }

        if let Some(min_amount) = self.min_amount {
            if expense.amount < min_amount {
                return false;
            }
        }

        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub step_order: u32,
    pub approver_id: UserId,
    pub due_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainBuildError {
    #[error("approval chain configuration requires no approvals; refusing to build an empty chain")]
    EmptyChain,
    #[error("no resolvable approver for step {step_order}")]
    NoResolvableApprover { step_order: u32 },
}

/// Per-company chain config and rule set, keyed by company.
pub trait CompanyConfigSource: Send + Sync {
    fn chain_config(&self, company: &CompanyId) -> Option<ApprovalChainConfig>;
    fn rules(&self, company: &CompanyId) -> Vec<ApprovalRule>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryCompanyConfigSource {
    configs: HashMap<String, ApprovalChainConfig>,
    rules: HashMap<String, Vec<ApprovalRule>>,
}

impl InMemoryCompanyConfigSource {
    pub fn with_config(mut self, company: CompanyId, config: ApprovalChainConfig) -> Self {
        self.configs.insert(company.0, config);
        self
    }

    pub fn with_rules(mut self, company: CompanyId, rules: Vec<ApprovalRule>) -> Self {
        self.rules.insert(company.0, rules);
        self
    }
}

impl CompanyConfigSource for InMemoryCompanyConfigSource {
    fn chain_config(&self, company: &CompanyId) -> Option<ApprovalChainConfig> {
        self.configs.get(&company.0).cloned()
    }

    fn rules(&self, company: &CompanyId) -> Vec<ApprovalRule> {
        self.rules.get(&company.0).cloned().unwrap_or_default()
    }
}

/// Materializes the ordered approval chain for a freshly submitted expense.
pub struct ChainBuilder<D> {
    directory: D,
}

impl<D> ChainBuilder<D>
where
    D: OrgDirectory,
{
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn build(
        &self,
        expense: &Expense,
        config: &ApprovalChainConfig,
        rules: &[ApprovalRule],
        now: DateTime<Utc>,
    ) -> Result<Vec<PlannedStep>, ChainBuildError> {
        if config.required_approvals.is_empty() {
            return Err(ChainBuildError::EmptyChain);
        }

        let matched_rule = self.match_rule(rules, expense);
        let escalation_hours = matched_rule
            .and_then(|rule| rule.escalation_hours)
            .unwrap_or(config.escalation_hours);
        let due_date = now + Duration::hours(escalation_hours);

        let mut steps = Vec::with_capacity(config.required_approvals.len());
        for (index, requirement) in config.required_approvals.iter().enumerate() {
            let step_order = index as u32 + 1;
            // A matched rule's designated approver redirects the first step
            // only; later steps keep their role-based resolution.
            let rule_approver =
                (step_order == 1).then(|| matched_rule.and_then(|rule| rule.approver_id.clone()));

            let approver = rule_approver
                .flatten()
                .or_else(|| self.resolve_requirement(requirement, expense))
                .ok_or(ChainBuildError::NoResolvableApprover { step_order })?;

            steps.push(PlannedStep { step_order, approver_id: approver, due_date });
        }

        Ok(steps)
    }

    /// Deterministic rule selection: priority descending, then name
    /// ascending. Exactly one rule wins.
    fn match_rule<'r>(&self, rules: &'r [ApprovalRule], expense: &Expense) -> Option<&'r ApprovalRule> {
        let owner_department = self.directory.department_of(&expense.employee_id);
        let mut matches: Vec<&ApprovalRule> = rules
            .iter()
            .filter(|rule| rule.matches(expense, owner_department.as_deref()))
            .collect();
        matches.sort_by(|left, right| {
            right.priority.cmp(&left.priority).then_with(|| left.name.cmp(&right.name))
        });
        matches.into_iter().next()
    }

    fn resolve_requirement(
        &self,
        requirement: &ApproverRequirement,
        expense: &Expense,
    ) -> Option<UserId> {
        match requirement {
            ApproverRequirement::User(user) => Some(user.clone()),
            ApproverRequirement::Role(Role::Manager) => self
                .directory
                .manager_of(&expense.employee_id)
                .or_else(|| self.directory.company_admin(&expense.company_id)),
            ApproverRequirement::Role(Role::Admin) => {
                self.directory.company_admin(&expense.company_id)
            }
            // Employees never approve; a config that asks for one is broken.
            ApproverRequirement::Role(Role::Employee) => None,
        }
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{
        ApprovalChainConfig, ApprovalRule, ApproverRequirement, ChainBuildError, ChainBuilder,
        InMemoryOrgDirectory,
    };
    use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus};
    use crate::domain::identity::{CompanyId, Role, UserId};

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    fn expense(amount: Decimal) -> Expense {
        let now = Utc::now();
        Expense {
            id: ExpenseId("EXP-2026-001".to_string()),
            employee_id: user("u-emp"),
            company_id: CompanyId("c-1".to_string()),
            amount,
            currency: "USD".to_string(),
            category: "travel".to_string(),
            description: "Client visit".to_string(),
            status: ExpenseStatus::Submitted,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn directory() -> InMemoryOrgDirectory {
        InMemoryOrgDirectory::default()
            .with_manager(user("u-emp"), user("u-mgr"))
            .with_department(user("u-emp"), "sales")
            .with_admin(CompanyId("c-1".to_string()), user("u-admin"))
    }

    fn rule(id: &str, name: &str, priority: i32, approver: Option<&str>) -> ApprovalRule {
        ApprovalRule {
            id: id.to_string(),
            name: name.to_string(),
            priority,
            category: None,
            department: None,
            employee_id: None,
            min_amount: None,
            approver_id: approver.map(user),
            escalation_hours: None,
        }
    }

    fn two_step_config() -> ApprovalChainConfig {
        ApprovalChainConfig {
            required_approvals: vec![
                ApproverRequirement::Role(Role::Manager),
                ApproverRequirement::Role(Role::Admin),
            ],
            escalation_hours: 48,
            escalation_target: None,
            auto_approve_under: None,
        }
    }

    #[test]
    fn builds_ordered_steps_with_due_dates_from_escalation_hours() {
        let builder = ChainBuilder::new(directory());
        let now = Utc::now();

        let steps = builder
            .build(&expense(Decimal::new(20_000, 2)), &two_step_config(), &[], now)
            .expect("chain should build");

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_order, 1);
        assert_eq!(steps[0].approver_id, user("u-mgr"));
        assert_eq!(steps[1].step_order, 2);
        assert_eq!(steps[1].approver_id, user("u-admin"));
        assert_eq!(steps[0].due_date, now + Duration::hours(48));
    }

    #[test]
    fn matched_rule_approver_redirects_the_first_step_only() {
        let builder = ChainBuilder::new(directory());
        let rules = vec![rule("r-1", "travel-desk", 10, Some("u-travel-lead"))];

        let steps = builder
            .build(&expense(Decimal::new(20_000, 2)), &two_step_config(), &rules, Utc::now())
            .expect("chain should build");

        assert_eq!(steps[0].approver_id, user("u-travel-lead"));
        assert_eq!(steps[1].approver_id, user("u-admin"));
    }

    #[test]
    fn rule_selection_is_priority_desc_then_name_asc() {
        let builder = ChainBuilder::new(directory());
        let rules = vec![
            rule("r-1", "zeta", 10, Some("u-zeta")),
            rule("r-2", "alpha", 10, Some("u-alpha")),
            rule("r-3", "low", 1, Some("u-low")),
        ];

        let steps = builder
            .build(&expense(Decimal::new(20_000, 2)), &two_step_config(), &rules, Utc::now())
            .expect("chain should build");

        assert_eq!(steps[0].approver_id, user("u-alpha"));
    }

    #[test]
    fn rule_criteria_must_all_hold() {
        let builder = ChainBuilder::new(directory());
        let mut threshold = rule("r-1", "big-spend", 10, Some("u-finance"));
        threshold.min_amount = Some(Decimal::new(50_000, 2));
        let mut wrong_department = rule("r-2", "eng-only", 20, Some("u-eng-lead"));
        wrong_department.department = Some("engineering".to_string());

        let steps = builder
            .build(
                &expense(Decimal::new(20_000, 2)),
                &two_step_config(),
                &[threshold, wrong_department],
                Utc::now(),
            )
            .expect("chain should build");

        // Neither rule matches a $200 sales expense; fall back to the manager.
        assert_eq!(steps[0].approver_id, user("u-mgr"));
    }

    #[test]
    fn amount_threshold_rule_matches_at_or_above() {
        let builder = ChainBuilder::new(directory());
        let mut threshold = rule("r-1", "big-spend", 10, Some("u-finance"));
        threshold.min_amount = Some(Decimal::new(50_000, 2));

        let steps = builder
            .build(
                &expense(Decimal::new(50_000, 2)),
                &two_step_config(),
                &[threshold],
                Utc::now(),
            )
            .expect("chain should build");

        assert_eq!(steps[0].approver_id, user("u-finance"));
    }

    #[test]
    fn rule_escalation_hours_override_company_default() {
        let builder = ChainBuilder::new(directory());
        let mut fast = rule("r-1", "fast-lane", 10, None);
        fast.escalation_hours = Some(4);
        let now = Utc::now();

        let steps = builder
            .build(&expense(Decimal::new(20_000, 2)), &two_step_config(), &[fast], now)
            .expect("chain should build");

        assert_eq!(steps[0].due_date, now + Duration::hours(4));
    }

    #[test]
    fn missing_manager_falls_back_to_company_admin() {
        let no_manager = InMemoryOrgDirectory::default()
            .with_admin(CompanyId("c-1".to_string()), user("u-admin"));
        let builder = ChainBuilder::new(no_manager);

        let steps = builder
            .build(&expense(Decimal::new(20_000, 2)), &two_step_config(), &[], Utc::now())
            .expect("chain should build");

        assert_eq!(steps[0].approver_id, user("u-admin"));
    }

    #[test]
    fn unresolvable_approver_fails_the_whole_build() {
        let builder = ChainBuilder::new(InMemoryOrgDirectory::default());

        let error = builder
            .build(&expense(Decimal::new(20_000, 2)), &two_step_config(), &[], Utc::now())
            .expect_err("no approver resolvable");

        assert_eq!(error, ChainBuildError::NoResolvableApprover { step_order: 1 });
    }

    #[test]
    fn empty_configuration_is_rejected() {
        let builder = ChainBuilder::new(directory());
        let config = ApprovalChainConfig { required_approvals: Vec::new(), ..two_step_config() };

        let error = builder
            .build(&expense(Decimal::new(20_000, 2)), &config, &[], Utc::now())
            .expect_err("empty chain must not build");

        assert_eq!(error, ChainBuildError::EmptyChain);
    }

    #[test]
    fn specific_user_requirement_resolves_directly() {
        let builder = ChainBuilder::new(directory());
        let config = ApprovalChainConfig {
            required_approvals: vec![ApproverRequirement::User(user("u-cfo"))],
            ..two_step_config()
        };

        let steps = builder
            .build(&expense(Decimal::new(20_000, 2)), &config, &[], Utc::now())
            .expect("chain should build");

        assert_eq!(steps[0].approver_id, user("u-cfo"));
    }
}
