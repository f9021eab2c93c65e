//! Core data model: the row-shaped types every other module operates on.
//!
//! Mirrors the entities in spec.md §3. These are plain structs with
//! `sqlx::FromRow` derives; no behavior lives here beyond small derivations
//! that are properties of the data itself (e.g. `Shipment::is_sessionable`).

mod collection;
mod fingerprint;
mod qc_item;
mod queue_record;
mod repair_job;
mod session;
mod shipment;

pub use collection::CollectionMapping;
pub use fingerprint::{Fingerprint, FingerprintModel, FingerprintStatus};
pub use qc_item::QcItem;
pub use queue_record::{QueueKind, QueueRecord, QueueStatus};
pub use repair_job::{RepairJob, RepairJobStatus};
pub use session::{FulfillmentSession, SessionRowStatus};
pub use shipment::{
    DecisionSubphase, LifecyclePhase, RateCheckStatus, SessionStatus, Shipment, ShipmentItem,
    ShipmentStatus,
};
