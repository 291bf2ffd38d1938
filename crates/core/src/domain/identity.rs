use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub String);

/// Closed role set. Raw role strings coming from the identity provider go
/// through [`Role::parse`]; callers that must not fail degrade an unknown
/// role to the most restrictive scope instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }
}

/// Authenticated principal as supplied by the surrounding application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
    pub company_id: CompanyId,
    pub manager_id: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn role_round_trips_from_storage_encoding() {
        for role in [Role::Admin, Role::Manager, Role::Employee] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn unknown_role_does_not_parse() {
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::parse(""), None);
    }
}
