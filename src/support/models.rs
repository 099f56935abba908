use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a support case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    InProgress,
    Resolved,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Open => "open",
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(CaseStatus::Open),
            "in_progress" => Some(CaseStatus::InProgress),
            "resolved" => Some(CaseStatus::Resolved),
            _ => None,
        }
    }
}

/// A support case. The owner is fixed at creation; `updated_at` moves on
/// every new message and status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportCase {
    pub id: usize,
    pub user_id: usize,
    pub subject: String,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One message in a case transcript. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseMessage {
    pub id: usize,
    pub support_case_id: usize,
    pub user_id: usize,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A message decorated with the author's admin status as it is at read
/// time. The flag is never persisted, so granting or revoking the admin
/// role relabels past messages on the next read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseMessageView {
    #[serde(flatten)]
    pub message: CaseMessage,
    pub is_admin: bool,
}
