use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::FingerprintStatus;

/// External shipment status as reported by the label provider / storefront.
///
/// Kept as a string newtype rather than a closed enum: spec.md lists a
/// representative set (`on_hold | pending | label_pending | label_purchased |
/// cancelled | …`) but does not close the set, and new provider statuses
/// should not require a code change to tolerate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct ShipmentStatus(pub String);

impl ShipmentStatus {
    pub const ON_HOLD: &'static str = "on_hold";
    pub const PENDING: &'static str = "pending";
    pub const LABEL_PENDING: &'static str = "label_pending";
    pub const LABEL_PURCHASED: &'static str = "label_purchased";
    pub const CANCELLED: &'static str = "cancelled";

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl From<&str> for ShipmentStatus {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// External session status, lowercased on ingest (spec.md §4.6 step 3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    New,
    Active,
    Inactive,
    Closed,
}

impl SessionStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Closed => "closed",
        }
    }
}

/// Derived lifecycle phase (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    OnDock,
    PickingIssues,
    PackingReady,
    Picking,
    ReadyToPick,
    ReadyToSession,
    AwaitingDecisions,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnDock => "ON_DOCK",
            Self::PickingIssues => "PICKING_ISSUES",
            Self::PackingReady => "PACKING_READY",
            Self::Picking => "PICKING",
            Self::ReadyToPick => "READY_TO_PICK",
            Self::ReadyToSession => "READY_TO_SESSION",
            Self::AwaitingDecisions => "AWAITING_DECISIONS",
        }
    }
}

/// Decision subphase, only meaningful while `phase` is `ReadyToSession` or
/// `AwaitingDecisions` (spec.md §4.3 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionSubphase {
    NeedsCategorization,
    NeedsFingerprint,
    NeedsPackaging,
    NeedsSession,
    ReadyForSkuvault,
}

impl DecisionSubphase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsCategorization => "NEEDS_CATEGORIZATION",
            Self::NeedsFingerprint => "NEEDS_FINGERPRINT",
            Self::NeedsPackaging => "NEEDS_PACKAGING",
            Self::NeedsSession => "NEEDS_SESSION",
            Self::ReadyForSkuvault => "READY_FOR_SKUVAULT",
        }
    }
}

/// Rate-check status (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RateCheckStatus {
    #[default]
    None,
    Pending,
    Complete,
    Skipped,
    Failed,
}

impl RateCheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// The central aggregate: spec.md §3 "Shipment".
#[derive(Debug, Clone)]
pub struct Shipment {
    pub id: Uuid,
    pub external_shipment_key: Option<String>,
    pub external_order_number: String,
    pub carrier: Option<String>,
    pub service_code: Option<String>,
    pub destination_postal_code: Option<String>,
    pub destination_state: Option<String>,
    pub tracking_number: Option<String>,
    pub shipment_status: ShipmentStatus,
    pub delivery_status_code: Option<String>,
    pub session_status: Option<SessionStatus>,
    pub lifecycle_phase: Option<LifecyclePhase>,
    pub decision_subphase: Option<DecisionSubphase>,
    pub fingerprint_status: Option<FingerprintStatus>,
    pub fingerprint_id: Option<Uuid>,
    pub packaging_type_id: Option<Uuid>,
    pub station_id: Option<Uuid>,
    pub fulfillment_session_id: Option<Uuid>,
    pub smart_session_spot: Option<i32>,
    pub rate_check_status: RateCheckStatus,
    pub proactive_hydration: bool,
    pub has_move_over_tag: bool,
    pub cancelled: bool,
    pub external_session_id: Option<String>,
    pub external_document_id: Option<String>,
    pub picked_by_user_id: Option<String>,
    pub picked_by_user_name: Option<String>,
    pub saved_custom_field_2: Option<String>,
    pub pick_started_at: Option<DateTime<Utc>>,
    pub pick_ended_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    /// spec.md §4.3 step 6: `ready_to_session` gate, also the gate the
    /// session batcher (§4.8 step 1) and the `READY_TO_SESSION` phase rule
    /// (§4.3 step 6) both use.
    pub fn meets_ready_to_session_gate(&self) -> bool {
        self.shipment_status.is(ShipmentStatus::ON_HOLD)
            && self.has_move_over_tag
            && self.session_status.is_none()
            && !self.cancelled
    }

}

/// Purchased line item exactly as it arrived from the storefront
/// (spec.md §3 "Shipment item (purchased)").
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShipmentItem {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub sku: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub requires_shipping: bool,
}
