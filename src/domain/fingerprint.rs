use uuid::Uuid;

/// spec.md §3 "Fingerprint" — canonical packaging signature.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Fingerprint {
    pub id: Uuid,
    pub signature: String,
    pub signature_hash: String,
    pub display_name: String,
    pub item_count: i32,
    pub total_weight: f64,
    pub weight_unit: String,
}

/// spec.md §3 "Fingerprint model" — persistent packaging decision.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FingerprintModel {
    pub id: Uuid,
    pub fingerprint_id: Uuid,
    pub packaging_type_id: Uuid,
}

/// spec.md §3 / §4.2 step 6: status of the fingerprinting computation for a
/// shipment, distinct from the fingerprint row itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintStatus {
    Complete,
    PendingCategorization,
    MissingWeight,
    NeedsRecalc,
}

impl FingerprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::PendingCategorization => "pending_categorization",
            Self::MissingWeight => "missing_weight",
            Self::NeedsRecalc => "needs_recalc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "complete" => Some(Self::Complete),
            "pending_categorization" => Some(Self::PendingCategorization),
            "missing_weight" => Some(Self::MissingWeight),
            "needs_recalc" => Some(Self::NeedsRecalc),
            _ => None,
        }
    }
}
