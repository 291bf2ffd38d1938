use std::collections::{HashMap, HashSet};

use crate::domain::identity::{CompanyId, Identity, Role, UserId};

/// Reverse manager lookup. Deliberately one hop: a manager sees direct
/// reports only, not the transitive closure. A deeper hierarchy walk would
/// plug in here without touching the resolver.
pub trait SubordinateDirectory {
    fn subordinates(&self, manager: &UserId) -> HashSet<UserId>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemorySubordinateDirectory {
    reports: HashMap<String, HashSet<UserId>>,
}

impl InMemorySubordinateDirectory {
    pub fn from_manager_pairs(pairs: impl IntoIterator<Item = (UserId, UserId)>) -> Self {
        let mut reports: HashMap<String, HashSet<UserId>> = HashMap::new();
        for (user, manager) in pairs {
            reports.entry(manager.0).or_default().insert(user);
        }
        Self { reports }
    }
}

impl SubordinateDirectory for InMemorySubordinateDirectory {
    fn subordinates(&self, manager: &UserId) -> HashSet<UserId> {
        self.reports.get(&manager.0).cloned().unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ScopeKind {
    Own(UserId),
    Team { owner: UserId, members: HashSet<UserId> },
    Company,
}

/// A visibility predicate over expense-owning employees. Callers combine it
/// with their own pagination and ordering; it never materializes a list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpenseScope {
    company_id: CompanyId,
    kind: ScopeKind,
}

impl ExpenseScope {
    pub fn for_identity(identity: &Identity, directory: &dyn SubordinateDirectory) -> Self {
        let kind = match identity.role {
            Role::Employee => ScopeKind::Own(identity.user_id.clone()),
            Role::Manager => ScopeKind::Team {
                owner: identity.user_id.clone(),
                members: directory.subordinates(&identity.user_id),
            },
            Role::Admin => ScopeKind::Company,
        };
        Self { company_id: identity.company_id.clone(), kind }
    }

    /// For raw role strings from outside the closed enum. Unknown roles
    /// degrade to the employee-equivalent scope; this path never fails.
    pub fn for_raw_role(
        raw_role: &str,
        user_id: UserId,
        company_id: CompanyId,
        directory: &dyn SubordinateDirectory,
    ) -> Self {
        let role = Role::parse(raw_role).unwrap_or(Role::Employee);
        let identity = Identity { user_id, role, company_id, manager_id: None };
        Self::for_identity(&identity, directory)
    }

    pub fn company_id(&self) -> &CompanyId {
        &self.company_id
    }

    /// Whether a record owned by `employee_id` in `company_id` is visible.
    /// Cross-company access is denied regardless of role.
    pub fn permits(&self, employee_id: &UserId, company_id: &CompanyId) -> bool {
        if company_id != &self.company_id {
            return false;
        }
        match &self.kind {
            ScopeKind::Own(owner) => employee_id == owner,
            ScopeKind::Team { owner, members } => {
                employee_id == owner || members.contains(employee_id)
            }
            ScopeKind::Company => true,
        }
    }

    /// The employee ids this scope is restricted to, or `None` when the
    /// whole company is visible. Storage layers use this to build filters.
    pub fn employee_ids(&self) -> Option<Vec<UserId>> {
        match &self.kind {
            ScopeKind::Own(owner) => Some(vec![owner.clone()]),
            ScopeKind::Team { owner, members } => {
                let mut ids: Vec<UserId> = members.iter().cloned().collect();
                ids.push(owner.clone());
                ids.sort_by(|left, right| left.0.cmp(&right.0));
                Some(ids)
            }
            ScopeKind::Company => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExpenseScope, InMemorySubordinateDirectory, SubordinateDirectory};
    use crate::domain::identity::{CompanyId, Identity, Role, UserId};

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    fn company(id: &str) -> CompanyId {
        CompanyId(id.to_string())
    }

    fn directory() -> InMemorySubordinateDirectory {
        // u-emp reports to u-mgr; u-junior reports to u-emp.
        InMemorySubordinateDirectory::from_manager_pairs(vec![
            (user("u-emp"), user("u-mgr")),
            (user("u-junior"), user("u-emp")),
        ])
    }

    fn identity(id: &str, role: Role) -> Identity {
        Identity { user_id: user(id), role, company_id: company("c-1"), manager_id: None }
    }

    #[test]
    fn employee_sees_only_own_records() {
        let scope = ExpenseScope::for_identity(&identity("u-emp", Role::Employee), &directory());

        assert!(scope.permits(&user("u-emp"), &company("c-1")));
        assert!(!scope.permits(&user("u-junior"), &company("c-1")));
    }

    #[test]
    fn manager_sees_self_and_direct_reports_only() {
        let scope = ExpenseScope::for_identity(&identity("u-mgr", Role::Manager), &directory());

        assert!(scope.permits(&user("u-mgr"), &company("c-1")));
        assert!(scope.permits(&user("u-emp"), &company("c-1")));
        // One hop only: the report's report is not visible.
        assert!(!scope.permits(&user("u-junior"), &company("c-1")));
    }

    #[test]
    fn admin_sees_the_whole_company() {
        let scope = ExpenseScope::for_identity(&identity("u-admin", Role::Admin), &directory());

        assert!(scope.permits(&user("u-emp"), &company("c-1")));
        assert!(scope.permits(&user("u-junior"), &company("c-1")));
        assert_eq!(scope.employee_ids(), None);
    }

    #[test]
    fn cross_company_access_is_always_denied() {
        for role in [Role::Employee, Role::Manager, Role::Admin] {
            let scope = ExpenseScope::for_identity(&identity("u-mgr", role), &directory());
            assert!(!scope.permits(&user("u-mgr"), &company("c-other")));
        }
    }

    #[test]
    fn unknown_raw_role_degrades_to_employee_scope() {
        let scope =
            ExpenseScope::for_raw_role("superuser", user("u-emp"), company("c-1"), &directory());

        assert!(scope.permits(&user("u-emp"), &company("c-1")));
        assert!(!scope.permits(&user("u-junior"), &company("c-1")));
    }

    #[test]
    fn team_scope_lists_owner_and_members_sorted() {
        let scope = ExpenseScope::for_identity(&identity("u-mgr", Role::Manager), &directory());
        let ids = scope.employee_ids().expect("team scope is bounded");

        assert_eq!(ids, vec![user("u-emp"), user("u-mgr")]);
    }

    #[test]
    fn directory_returns_empty_set_for_unknown_manager() {
        assert!(directory().subordinates(&user("u-nobody")).is_empty());
    }
}
