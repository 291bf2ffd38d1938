use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::expense::ExpenseId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryId(pub String);

/// `Reopened` is reserved by the data model but no workflow transition
/// emits it; kept for forward compatibility with the audit schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Submitted,
    Approved,
    Rejected,
    Escalated,
    Cancelled,
    Reopened,
    Commented,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Escalated => "escalated",
            Self::Cancelled => "cancelled",
            Self::Reopened => "reopened",
            Self::Commented => "commented",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "escalated" => Some(Self::Escalated),
            "cancelled" => Some(Self::Cancelled),
            "reopened" => Some(Self::Reopened),
            "commented" => Some(Self::Commented),
            _ => None,
        }
    }
}

/// Append-only audit row. Written as a side effect of every workflow
/// action; never updated, never deleted, never consulted to drive state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalHistory {
    pub id: HistoryId,
    pub expense_id: ExpenseId,
    pub action: HistoryAction,
    pub actor_id: String,
    pub old_status: Option<String>,
    pub new_status: Option<String>,
    pub comments: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl ApprovalHistory {
    pub fn new(
        expense_id: ExpenseId,
        action: HistoryAction,
        actor_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryId(Uuid::new_v4().to_string()),
            expense_id,
            action,
            actor_id: actor_id.into(),
            old_status: None,
            new_status: None,
            comments: None,
            metadata: BTreeMap::new(),
            occurred_at,
        }
    }

    pub fn with_status_change(
        mut self,
        old_status: impl Into<String>,
        new_status: impl Into<String>,
    ) -> Self {
        self.old_status = Some(old_status.into());
        self.new_status = Some(new_status.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments = Some(comment.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Storage encoding of the metadata bag.
    pub fn metadata_json(&self) -> String {
        serde_json::to_string(&self.metadata).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn metadata_from_json(raw: &str) -> BTreeMap<String, String> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .map(|(key, value)| match value {
                    Value::String(text) => (key, text),
                    other => (key, other.to_string()),
                })
                .collect(),
            _ => BTreeMap::new(),
        }
    }
}
