use chrono::{DateTime, Utc};
use uuid::Uuid;

/// spec.md §4.8: session status transitions `draft → ready → picking →
/// packing → completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRowStatus {
    Draft,
    Ready,
    Picking,
    Packing,
    Completed,
}

impl SessionRowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Ready => "ready",
            Self::Picking => "picking",
            Self::Packing => "packing",
            Self::Completed => "completed",
        }
    }

    /// The next status in the monotone sequence, or `None` if terminal.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Draft => Some(Self::Ready),
            Self::Ready => Some(Self::Picking),
            Self::Picking => Some(Self::Packing),
            Self::Packing => Some(Self::Completed),
            Self::Completed => None,
        }
    }
}

/// spec.md §3 "Fulfillment session" — physical cart/batch.
#[derive(Debug, Clone)]
pub struct FulfillmentSession {
    pub id: Uuid,
    pub station_type: String,
    pub station_id: Uuid,
    pub order_count: i32,
    pub max_orders: i32,
    pub status: SessionRowStatus,
    pub sequence_number: i32,
    pub day_key: chrono::NaiveDate,
    pub ready_at: Option<DateTime<Utc>>,
    pub picking_at: Option<DateTime<Utc>>,
    pub packing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl FulfillmentSession {
    pub fn remaining_capacity(&self) -> i32 {
        (self.max_orders - self.order_count).max(0)
    }

    pub fn has_room(&self) -> bool {
        self.remaining_capacity() > 0
    }
}
