use chrono::{DateTime, Utc};
use uuid::Uuid;

/// spec.md §4.9: a claim-based batched reconciliation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RepairJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepairJob {
    pub id: Uuid,
    pub kind: String,
    pub status: RepairJobStatus,
    pub processed_count: i64,
    pub cancel_requested: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
