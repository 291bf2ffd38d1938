use spendflow_core::domain::identity::{Identity, UserId};

/// Actor id recorded in history rows for scanner-driven actions.
pub const SYSTEM_ACTOR_ID: &str = "system";

/// Who is performing a workflow action: an authenticated principal, or the
/// engine itself (escalation sweeps only).
#[derive(Clone, Debug)]
pub enum Actor {
    System,
    User(Identity),
}

impl Actor {
    pub fn actor_id(&self) -> &str {
        match self {
            Self::System => SYSTEM_ACTOR_ID,
            Self::User(identity) => identity.user_id.0.as_str(),
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::System => None,
            Self::User(identity) => Some(&identity.user_id),
        }
    }
}
