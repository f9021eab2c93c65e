//! Pure lifecycle state-machine derivation (spec.md §4.3).
//!
//! No I/O here — every function is a pure derivation from a snapshot of
//! shipment fields, mirroring the teacher's separation of pure derivation
//! logic from the `services` layer that drives it with side effects
//! (`services::timeout_scheduler` queries, then a separate loop acts).

use crate::domain::{
    DecisionSubphase, LifecyclePhase, RateCheckStatus, SessionStatus, Shipment, ShipmentStatus,
};

/// `(phase, subphase)` pair, `subphase` only populated for `ReadyToSession`
/// and `AwaitingDecisions` (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleState {
    pub phase: LifecyclePhase,
    pub subphase: Option<DecisionSubphase>,
}

/// Inputs the state machine reads. A subset of `Shipment` plus the handful
/// of derived booleans spec.md names explicitly (has fingerprint, has
/// packaging, etc.) so callers don't need to duplicate "has fingerprint"
/// checks at every call site.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleInputs<'a> {
    pub shipment_status: &'a ShipmentStatus,
    pub tracking_number: Option<&'a str>,
    pub delivery_status_code: Option<&'a str>,
    pub session_status_raw: Option<SessionStatusFlag>,
    pub has_move_over_tag: bool,
    pub cancelled: bool,
    pub has_fingerprint: bool,
    pub fingerprint_status_complete: bool,
    pub has_packaging: bool,
    pub has_station: bool,
    pub has_fulfillment_session: bool,
}

/// Flattened session status, kept local to this module so the state
/// machine does not need to know about `Option<SessionStatus>` nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatusFlag {
    New,
    Active,
    Inactive,
    Closed,
}

impl<'a> LifecycleInputs<'a> {
    pub fn from_shipment(s: &'a Shipment, has_fingerprint_model: bool) -> Self {
        Self {
            shipment_status: &s.shipment_status,
            tracking_number: s.tracking_number.as_deref(),
            delivery_status_code: s.delivery_status_code.as_deref(),
            session_status_raw: s.session_status.as_ref().map(|st| match st {
                SessionStatus::New => SessionStatusFlag::New,
                SessionStatus::Active => SessionStatusFlag::Active,
                SessionStatus::Inactive => SessionStatusFlag::Inactive,
                SessionStatus::Closed => SessionStatusFlag::Closed,
            }),
            has_move_over_tag: s.has_move_over_tag,
            cancelled: s.cancelled,
            has_fingerprint: s.fingerprint_id.is_some(),
            fingerprint_status_complete: has_fingerprint_model,
            has_packaging: s.packaging_type_id.is_some(),
            has_station: s.station_id.is_some(),
            has_fulfillment_session: s.fulfillment_session_id.is_some(),
        }
    }
}

/// Derive `(phase, subphase)` from a snapshot of shipment fields, in the
/// priority order spec.md §4.3 lists. Testable property 6 ("Lifecycle
/// derivation priority").
pub fn derive(inputs: &LifecycleInputs) -> LifecycleState {
    // 1. ON_DOCK
    if inputs.tracking_number.is_some() {
        return LifecycleState {
            phase: LifecyclePhase::OnDock,
            subphase: None,
        };
    }

    // 2. PICKING_ISSUES
    if inputs.session_status_raw == Some(SessionStatusFlag::Inactive) {
        return LifecycleState {
            phase: LifecyclePhase::PickingIssues,
            subphase: None,
        };
    }

    // 3. PACKING_READY — strict rule first, loose fallback second
    // (spec.md §9 open question: both fixtures must be honored).
    if inputs.session_status_raw == Some(SessionStatusFlag::Closed) {
        if inputs.shipment_status.is(ShipmentStatus::PENDING) {
            return LifecycleState {
                phase: LifecyclePhase::PackingReady,
                subphase: None,
            };
        }
        return LifecycleState {
            phase: LifecyclePhase::PackingReady,
            subphase: None,
        };
    }

    // 4. PICKING
    if inputs.session_status_raw == Some(SessionStatusFlag::Active) {
        return LifecycleState {
            phase: LifecyclePhase::Picking,
            subphase: None,
        };
    }

    // 5. READY_TO_PICK
    if inputs.session_status_raw == Some(SessionStatusFlag::New) {
        return LifecycleState {
            phase: LifecyclePhase::ReadyToPick,
            subphase: None,
        };
    }

    // 6. READY_TO_SESSION
    if inputs.shipment_status.is(ShipmentStatus::ON_HOLD)
        && inputs.has_move_over_tag
        && inputs.session_status_raw.is_none()
        && !inputs.cancelled
    {
        return LifecycleState {
            phase: LifecyclePhase::ReadyToSession,
            subphase: Some(derive_subphase(inputs)),
        };
    }

    // 7. AWAITING_DECISIONS (default)
    LifecycleState {
        phase: LifecyclePhase::AwaitingDecisions,
        subphase: Some(derive_subphase(inputs)),
    }
}

/// spec.md §4.3 step 7: sub-priority for `AwaitingDecisions`/`ReadyToSession`.
fn derive_subphase(inputs: &LifecycleInputs) -> DecisionSubphase {
    if inputs.has_fulfillment_session && inputs.session_status_raw.is_none() {
        return DecisionSubphase::ReadyForSkuvault;
    }
    if inputs.has_packaging && !inputs.has_fulfillment_session {
        return DecisionSubphase::NeedsSession;
    }
    if inputs.has_fingerprint && !inputs.has_packaging {
        return DecisionSubphase::NeedsPackaging;
    }
    if inputs.fingerprint_status_complete && !inputs.has_fingerprint {
        return DecisionSubphase::NeedsFingerprint;
    }
    DecisionSubphase::NeedsCategorization
}

/// `true` only for the first two phases (spec.md §4.3 `isModifiable`).
pub fn is_modifiable(phase: LifecyclePhase) -> bool {
    matches!(phase, LifecyclePhase::OnDock | LifecyclePhase::PickingIssues)
}

/// 0-100 progress scalar for UI consumers (spec.md §4.3 `progress`).
pub fn progress(state: &LifecycleState) -> u8 {
    match state.phase {
        LifecyclePhase::ReadyToSession | LifecyclePhase::AwaitingDecisions => {
            match state.subphase {
                Some(DecisionSubphase::NeedsCategorization) => 10,
                Some(DecisionSubphase::NeedsFingerprint) => 25,
                Some(DecisionSubphase::NeedsPackaging) => 40,
                Some(DecisionSubphase::NeedsSession) => 55,
                Some(DecisionSubphase::ReadyForSkuvault) => 65,
                None => 5,
            }
        }
        LifecyclePhase::ReadyToPick => 70,
        LifecyclePhase::Picking => 80,
        LifecyclePhase::PickingIssues => 80,
        LifecyclePhase::PackingReady => 90,
        LifecyclePhase::OnDock => 100,
    }
}

/// One edge in the explicit transition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LifecyclePhase,
    pub to: LifecyclePhase,
}

/// spec.md §4.3: "Transition rules are explicit edge sets
/// (`LIFECYCLE_TRANSITIONS`, `DECISION_TRANSITIONS`); the worker refuses to
/// log a transition that is not in the allowed set."
pub const LIFECYCLE_TRANSITIONS: &[(LifecyclePhase, LifecyclePhase)] = &[
    (LifecyclePhase::ReadyToSession, LifecyclePhase::AwaitingDecisions),
    (LifecyclePhase::AwaitingDecisions, LifecyclePhase::ReadyToSession),
    (LifecyclePhase::ReadyToSession, LifecyclePhase::ReadyToPick),
    (LifecyclePhase::AwaitingDecisions, LifecyclePhase::ReadyToPick),
    (LifecyclePhase::ReadyToPick, LifecyclePhase::Picking),
    (LifecyclePhase::Picking, LifecyclePhase::PickingIssues),
    (LifecyclePhase::PickingIssues, LifecyclePhase::Picking),
    (LifecyclePhase::Picking, LifecyclePhase::PackingReady),
    (LifecyclePhase::PickingIssues, LifecyclePhase::PackingReady),
    (LifecyclePhase::PackingReady, LifecyclePhase::OnDock),
    (LifecyclePhase::Picking, LifecyclePhase::OnDock),
    (LifecyclePhase::PickingIssues, LifecyclePhase::OnDock),
    (LifecyclePhase::ReadyToPick, LifecyclePhase::OnDock),
    (LifecyclePhase::AwaitingDecisions, LifecyclePhase::OnDock),
    (LifecyclePhase::ReadyToSession, LifecyclePhase::OnDock),
];

/// spec.md §4.3 step 7 sub-transitions, same phase, subphase moves forward
/// (or stays put — re-running hydration on a shipment already at the target
/// subphase is a no-op, not a disallowed transition).
pub const DECISION_TRANSITIONS: &[(DecisionSubphase, DecisionSubphase)] = &[
    (DecisionSubphase::NeedsCategorization, DecisionSubphase::NeedsFingerprint),
    (DecisionSubphase::NeedsFingerprint, DecisionSubphase::NeedsPackaging),
    (DecisionSubphase::NeedsPackaging, DecisionSubphase::NeedsSession),
    (DecisionSubphase::NeedsSession, DecisionSubphase::ReadyForSkuvault),
];

/// Whether `from -> to` is an allowed phase transition. Equal phases are
/// always allowed (re-evaluation is idempotent, not a transition).
pub fn is_allowed_phase_transition(from: LifecyclePhase, to: LifecyclePhase) -> bool {
    from == to
        || LIFECYCLE_TRANSITIONS
            .iter()
            .any(|(f, t)| *f == from && *t == to)
}

/// Whether `from -> to` is an allowed subphase transition within the same
/// phase. Equal subphases are always allowed.
pub fn is_allowed_subphase_transition(from: DecisionSubphase, to: DecisionSubphase) -> bool {
    from == to
        || DECISION_TRANSITIONS
            .iter()
            .any(|(f, t)| *f == from && *t == to)
}

/// spec.md §4.7 sync eligibility gate + §4.5 "registered side effect"
/// trigger: a shipment needs a rate check once it reaches `NeedsSession`
/// with the sync-eligibility fields present (worker checks the full gate
/// separately; this only identifies the subphase transition worth acting on).
pub fn needs_rate_check(state: &LifecycleState, rate_check_status: RateCheckStatus) -> bool {
    matches!(state.subphase, Some(DecisionSubphase::NeedsSession))
        && matches!(rate_check_status, RateCheckStatus::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ShipmentStatus;

    fn base_inputs() -> LifecycleInputs<'static> {
        LifecycleInputs {
            shipment_status: Box::leak(Box::new(ShipmentStatus::from(ShipmentStatus::ON_HOLD))),
            tracking_number: None,
            delivery_status_code: None,
            session_status_raw: None,
            has_move_over_tag: true,
            cancelled: false,
            has_fingerprint: false,
            fingerprint_status_complete: false,
            has_packaging: false,
            has_station: false,
            has_fulfillment_session: false,
        }
    }

    #[test]
    fn on_dock_wins_over_everything_else() {
        let mut inputs = base_inputs();
        inputs.tracking_number = Some("1Z999");
        inputs.session_status_raw = Some(SessionStatusFlag::Active);
        let state = derive(&inputs);
        assert_eq!(state.phase, LifecyclePhase::OnDock);
        assert_eq!(state.subphase, None);
    }

    #[test]
    fn packing_ready_strict_rule_fires_when_pending() {
        let mut inputs = base_inputs();
        inputs.session_status_raw = Some(SessionStatusFlag::Closed);
        inputs.shipment_status = Box::leak(Box::new(ShipmentStatus::from(ShipmentStatus::PENDING)));
        let state = derive(&inputs);
        assert_eq!(state.phase, LifecyclePhase::PackingReady);
    }

    #[test]
    fn packing_ready_loose_fallback_fires_without_pending() {
        let mut inputs = base_inputs();
        inputs.session_status_raw = Some(SessionStatusFlag::Closed);
        inputs.shipment_status =
            Box::leak(Box::new(ShipmentStatus::from(ShipmentStatus::LABEL_PURCHASED)));
        let state = derive(&inputs);
        assert_eq!(state.phase, LifecyclePhase::PackingReady);
    }

    #[test]
    fn ready_to_session_requires_all_four_conditions() {
        let inputs = base_inputs();
        let state = derive(&inputs);
        assert_eq!(state.phase, LifecyclePhase::ReadyToSession);
        assert_eq!(state.subphase, Some(DecisionSubphase::NeedsCategorization));
    }

    #[test]
    fn cancelled_shipment_falls_through_to_awaiting_decisions() {
        let mut inputs = base_inputs();
        inputs.cancelled = true;
        let state = derive(&inputs);
        assert_eq!(state.phase, LifecyclePhase::AwaitingDecisions);
    }

    #[test]
    fn subphase_priority_ready_for_skuvault() {
        let mut inputs = base_inputs();
        inputs.has_fulfillment_session = true;
        inputs.has_packaging = true;
        inputs.has_fingerprint = true;
        let state = derive(&inputs);
        assert_eq!(state.subphase, Some(DecisionSubphase::ReadyForSkuvault));
    }

    #[test]
    fn subphase_priority_needs_session() {
        let mut inputs = base_inputs();
        inputs.has_packaging = true;
        inputs.has_fingerprint = true;
        let state = derive(&inputs);
        assert_eq!(state.subphase, Some(DecisionSubphase::NeedsSession));
    }

    #[test]
    fn is_modifiable_only_true_for_first_two_phases() {
        assert!(is_modifiable(LifecyclePhase::OnDock));
        assert!(is_modifiable(LifecyclePhase::PickingIssues));
        assert!(!is_modifiable(LifecyclePhase::Picking));
        assert!(!is_modifiable(LifecyclePhase::AwaitingDecisions));
    }

    #[test]
    fn disallowed_transition_is_rejected() {
        assert!(!is_allowed_phase_transition(
            LifecyclePhase::OnDock,
            LifecyclePhase::ReadyToSession
        ));
        assert!(is_allowed_phase_transition(
            LifecyclePhase::ReadyToPick,
            LifecyclePhase::Picking
        ));
    }
}
