use chrono::{DateTime, Utc};
use uuid::Uuid;

/// spec.md §4.4: the three durable, at-least-once FIFO queues share one
/// record shape, distinguished by `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum QueueKind {
    QcExplosion,
    RateCheck,
    LifecycleEvent,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QcExplosion => "qc_explosion",
            Self::RateCheck => "rate_check",
            Self::LifecycleEvent => "lifecycle_event",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "qc_explosion" => Some(Self::QcExplosion),
            "rate_check" => Some(Self::RateCheck),
            "lifecycle_event" => Some(Self::LifecycleEvent),
            _ => None,
        }
    }
}

/// spec.md §4.4 / §3 "Durable-queue record".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Queued,
    Processing,
    Failed,
    Completed,
    DeadLetter,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::DeadLetter => "dead_letter",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "failed" => Some(Self::Failed),
            "completed" => Some(Self::Completed),
            "dead_letter" => Some(Self::DeadLetter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueRecord {
    pub id: Uuid,
    pub kind: QueueKind,
    pub correlation_key: String,
    pub payload: serde_json::Value,
    pub status: QueueStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub last_http_status: Option<i32>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
