use chrono::Utc;
use sea_query::{Expr, Query};
use sea_query_binder::SqlxBinder;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::schema::Shipments;
use super::{Result, StorageError};
use crate::domain::{
    DecisionSubphase, FingerprintStatus, LifecyclePhase, RateCheckStatus, SessionStatus, Shipment,
    ShipmentItem, ShipmentStatus,
};

/// spec.md §4.2 step 1: the purchased items a hydration pass must explode.
pub async fn get_items(pool: &PgPool, shipment_id: Uuid) -> Result<Vec<ShipmentItem>> {
    let items = sqlx::query_as::<_, ShipmentItem>(
        "SELECT id, shipment_id, sku, quantity, unit_price_cents, requires_shipping FROM shipment_items WHERE shipment_id = $1",
    )
    .bind(shipment_id)
    .fetch_all(pool)
    .await?;
    Ok(items)
}

/// Load a shipment by id, re-reading the authoritative row every time
/// (spec.md §5 "the state machine reading the authoritative row every time").
pub async fn get(pool: &PgPool, id: Uuid) -> Result<Shipment> {
    let row = sqlx::query(
        r#"SELECT id, external_shipment_key, external_order_number, carrier, service_code,
                  destination_postal_code, destination_state, tracking_number, shipment_status,
                  delivery_status_code, session_status, lifecycle_phase, decision_subphase,
                  fingerprint_status, fingerprint_id, packaging_type_id, station_id,
                  fulfillment_session_id, smart_session_spot, rate_check_status,
                  proactive_hydration, has_move_over_tag, cancelled, external_session_id,
                  external_document_id, picked_by_user_id, picked_by_user_name,
                  saved_custom_field_2, pick_started_at, pick_ended_at, shipped_at, updated_at
           FROM shipments WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(StorageError::NotFound("shipment"))?;

    Ok(row_to_shipment(&row))
}

fn row_to_shipment(row: &sqlx::postgres::PgRow) -> Shipment {
    Shipment {
        id: row.get("id"),
        external_shipment_key: row.get("external_shipment_key"),
        external_order_number: row.get("external_order_number"),
        carrier: row.get("carrier"),
        service_code: row.get("service_code"),
        destination_postal_code: row.get("destination_postal_code"),
        destination_state: row.get("destination_state"),
        tracking_number: row.get("tracking_number"),
        shipment_status: ShipmentStatus(row.get::<String, _>("shipment_status")),
        delivery_status_code: row.get("delivery_status_code"),
        session_status: row
            .get::<Option<String>, _>("session_status")
            .and_then(|s| SessionStatus::parse(&s)),
        lifecycle_phase: row
            .get::<Option<String>, _>("lifecycle_phase")
            .and_then(|s| parse_phase(&s)),
        decision_subphase: row
            .get::<Option<String>, _>("decision_subphase")
            .and_then(|s| parse_subphase(&s)),
        fingerprint_status: row
            .get::<Option<String>, _>("fingerprint_status")
            .and_then(|s| FingerprintStatus::parse(&s)),
        fingerprint_id: row.get("fingerprint_id"),
        packaging_type_id: row.get("packaging_type_id"),
        station_id: row.get("station_id"),
        fulfillment_session_id: row.get("fulfillment_session_id"),
        smart_session_spot: row.get("smart_session_spot"),
        rate_check_status: row
            .get::<Option<String>, _>("rate_check_status")
            .and_then(|s| parse_rate_check_status(&s))
            .unwrap_or_default(),
        proactive_hydration: row.get("proactive_hydration"),
        has_move_over_tag: row.get("has_move_over_tag"),
        cancelled: row.get("cancelled"),
        external_session_id: row.get("external_session_id"),
        external_document_id: row.get("external_document_id"),
        picked_by_user_id: row.get("picked_by_user_id"),
        picked_by_user_name: row.get("picked_by_user_name"),
        saved_custom_field_2: row.get("saved_custom_field_2"),
        pick_started_at: row.get("pick_started_at"),
        pick_ended_at: row.get("pick_ended_at"),
        shipped_at: row.get("shipped_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn parse_phase(raw: &str) -> Option<LifecyclePhase> {
    Some(match raw {
        "ON_DOCK" => LifecyclePhase::OnDock,
        "PICKING_ISSUES" => LifecyclePhase::PickingIssues,
        "PACKING_READY" => LifecyclePhase::PackingReady,
        "PICKING" => LifecyclePhase::Picking,
        "READY_TO_PICK" => LifecyclePhase::ReadyToPick,
        "READY_TO_SESSION" => LifecyclePhase::ReadyToSession,
        "AWAITING_DECISIONS" => LifecyclePhase::AwaitingDecisions,
        _ => return None,
    })
}

pub fn parse_subphase(raw: &str) -> Option<DecisionSubphase> {
    Some(match raw {
        "NEEDS_CATEGORIZATION" => DecisionSubphase::NeedsCategorization,
        "NEEDS_FINGERPRINT" => DecisionSubphase::NeedsFingerprint,
        "NEEDS_PACKAGING" => DecisionSubphase::NeedsPackaging,
        "NEEDS_SESSION" => DecisionSubphase::NeedsSession,
        "READY_FOR_SKUVAULT" => DecisionSubphase::ReadyForSkuvault,
        _ => return None,
    })
}

fn parse_rate_check_status(raw: &str) -> Option<RateCheckStatus> {
    Some(match raw {
        "none" => RateCheckStatus::None,
        "pending" => RateCheckStatus::Pending,
        "complete" => RateCheckStatus::Complete,
        "skipped" => RateCheckStatus::Skipped,
        "failed" => RateCheckStatus::Failed,
        _ => return None,
    })
}

/// Atomically persist a `(phase, subphase)` transition plus `updated_at`
/// (spec.md §4.5 "persist `(phase, subphase)` atomically with `updatedAt`").
pub async fn update_lifecycle(
    pool: &PgPool,
    id: Uuid,
    phase: LifecyclePhase,
    subphase: Option<DecisionSubphase>,
) -> Result<()> {
    let (sql, values) = Query::update()
        .table(Shipments::Table)
        .value(Shipments::LifecyclePhase, phase.as_str())
        .value(
            Shipments::DecisionSubphase,
            subphase.map(|s| s.as_str().to_string()),
        )
        .value(Shipments::UpdatedAt, Utc::now())
        .and_where(Expr::col(Shipments::Id).eq(id))
        .build_sqlx(sea_query::PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(pool).await?;
    Ok(())
}

/// spec.md §4.8 step 6: set `fulfillmentSessionId` and `smartSessionSpot`
/// together as part of the batcher's write phase.
pub async fn assign_to_session(
    pool: &PgPool,
    id: Uuid,
    session_id: Uuid,
    spot: i32,
) -> Result<()> {
    let (sql, values) = Query::update()
        .table(Shipments::Table)
        .value(Shipments::FulfillmentSessionId, session_id)
        .value(Shipments::SmartSessionSpot, spot)
        .value(Shipments::UpdatedAt, Utc::now())
        .and_where(Expr::col(Shipments::Id).eq(id))
        .build_sqlx(sea_query::PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(pool).await?;
    Ok(())
}

/// spec.md §4.2 step 7 / §4.7: set fingerprint status, fingerprint,
/// packaging, and station together.
pub async fn update_fingerprint_and_packaging(
    pool: &PgPool,
    id: Uuid,
    fingerprint_status: Option<FingerprintStatus>,
    fingerprint_id: Option<Uuid>,
    packaging_type_id: Option<Uuid>,
    station_id: Option<Uuid>,
) -> Result<()> {
    let (sql, values) = Query::update()
        .table(Shipments::Table)
        .value(
            Shipments::FingerprintStatus,
            fingerprint_status.map(|s| s.as_str().to_string()),
        )
        .value(Shipments::FingerprintId, fingerprint_id)
        .value(Shipments::PackagingTypeId, packaging_type_id)
        .value(Shipments::StationId, station_id)
        .value(Shipments::UpdatedAt, Utc::now())
        .and_where(Expr::col(Shipments::Id).eq(id))
        .build_sqlx(sea_query::PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(pool).await?;
    Ok(())
}

/// spec.md §4.2 step 6: persist the fingerprint status alone, for the
/// deferred/pending-categorization/missing-weight hydration outcomes that
/// don't yet have a fingerprint id to go with it.
pub async fn update_fingerprint_status(pool: &PgPool, id: Uuid, status: FingerprintStatus) -> Result<()> {
    let (sql, values) = Query::update()
        .table(Shipments::Table)
        .value(Shipments::FingerprintStatus, status.as_str())
        .value(Shipments::UpdatedAt, Utc::now())
        .and_where(Expr::col(Shipments::Id).eq(id))
        .build_sqlx(sea_query::PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(pool).await?;
    Ok(())
}

pub async fn update_rate_check_status(
    pool: &PgPool,
    id: Uuid,
    status: RateCheckStatus,
) -> Result<()> {
    let (sql, values) = Query::update()
        .table(Shipments::Table)
        .value(Shipments::RateCheckStatus, status.as_str())
        .value(Shipments::UpdatedAt, Utc::now())
        .and_where(Expr::col(Shipments::Id).eq(id))
        .build_sqlx(sea_query::PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(pool).await?;
    Ok(())
}

/// spec.md §4.6 step 3: single normalized update from the session sync
/// worker. `picked_by_user_id`/`picked_by_user_name`/`saved_custom_field_2`
/// are the auxiliary fields the document carries alongside the fields the
/// lifecycle machine reads.
pub struct SessionSyncUpdate {
    pub session_status: SessionStatus,
    pub external_session_id: String,
    pub spot_number: Option<i32>,
    pub external_document_id: Option<String>,
    pub picked_by_user_id: Option<String>,
    pub picked_by_user_name: Option<String>,
    pub saved_custom_field_2: Option<String>,
    pub pick_started_at: Option<chrono::DateTime<Utc>>,
    pub pick_ended_at: Option<chrono::DateTime<Utc>>,
}

pub async fn apply_session_sync(pool: &PgPool, id: Uuid, update: &SessionSyncUpdate) -> Result<()> {
    let (sql, values) = Query::update()
        .table(Shipments::Table)
        .value(Shipments::SessionStatus, update.session_status.as_str())
        .value(Shipments::ExternalSessionId, update.external_session_id.clone())
        .value(Shipments::SmartSessionSpot, update.spot_number)
        .value(Shipments::ExternalDocumentId, update.external_document_id.clone())
        .value(Shipments::PickedByUserId, update.picked_by_user_id.clone())
        .value(Shipments::PickedByUserName, update.picked_by_user_name.clone())
        .value(Shipments::SavedCustomField2, update.saved_custom_field_2.clone())
        .value(Shipments::PickStartedAt, update.pick_started_at)
        .value(Shipments::PickEndedAt, update.pick_ended_at)
        .value(Shipments::UpdatedAt, Utc::now())
        .and_where(Expr::col(Shipments::Id).eq(id))
        .build_sqlx(sea_query::PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(pool).await?;
    Ok(())
}

/// spec.md §4.6 step 6: flip `sessionStatus` to `closed` after re-reading
/// the upstream session document.
pub async fn mark_session_closed(pool: &PgPool, id: Uuid) -> Result<()> {
    let (sql, values) = Query::update()
        .table(Shipments::Table)
        .value(Shipments::SessionStatus, SessionStatus::Closed.as_str())
        .value(Shipments::PickEndedAt, Utc::now())
        .value(Shipments::UpdatedAt, Utc::now())
        .and_where(Expr::col(Shipments::Id).eq(id))
        .build_sqlx(sea_query::PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(pool).await?;
    Ok(())
}

/// spec.md §4.6 step 2: find by `(orderNumber, externalShipmentId)`.
pub async fn find_by_order_and_external_id(
    pool: &PgPool,
    order_number: &str,
    external_shipment_id: &str,
) -> Result<Option<Shipment>> {
    let row = sqlx::query(
        r#"SELECT id, external_shipment_key, external_order_number, carrier, service_code,
                  destination_postal_code, destination_state, tracking_number, shipment_status,
                  delivery_status_code, session_status, lifecycle_phase, decision_subphase,
                  fingerprint_status, fingerprint_id, packaging_type_id, station_id,
                  fulfillment_session_id, smart_session_spot, rate_check_status,
                  proactive_hydration, has_move_over_tag, cancelled, external_session_id,
                  external_document_id, picked_by_user_id, picked_by_user_name,
                  saved_custom_field_2, pick_started_at, pick_ended_at, shipped_at, updated_at
           FROM shipments WHERE external_order_number = $1 AND external_shipment_key = $2"#,
    )
    .bind(order_number)
    .bind(external_shipment_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| row_to_shipment(&r)))
}

/// spec.md §4.6 step 6: shipments whose stored session status is one of the
/// non-closed values, used to detect closed transitions.
pub async fn ids_with_open_session_status(pool: &PgPool) -> Result<Vec<(Uuid, String, String)>> {
    let rows = sqlx::query(
        r#"SELECT id, external_session_id, session_status FROM shipments
           WHERE session_status IN ('new', 'active', 'inactive')
             AND external_session_id IS NOT NULL"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            (
                r.get::<Uuid, _>("id"),
                r.get::<String, _>("external_session_id"),
                r.get::<String, _>("session_status"),
            )
        })
        .collect())
}

/// spec.md §4.8 step 1: candidates for the session batcher, each paired with
/// its station's `stationType` (the batcher's primary grouping key).
pub async fn sessionable_candidates(pool: &PgPool, station_type: Option<&str>) -> Result<Vec<(Shipment, String)>> {
    let rows = sqlx::query(
        r#"SELECT s.id, s.external_shipment_key, s.external_order_number, s.carrier, s.service_code,
                  s.destination_postal_code, s.destination_state, s.tracking_number, s.shipment_status,
                  s.delivery_status_code, s.session_status, s.lifecycle_phase, s.decision_subphase,
                  s.fingerprint_status, s.fingerprint_id, s.packaging_type_id, s.station_id,
                  s.fulfillment_session_id, s.smart_session_spot, s.rate_check_status,
                  s.proactive_hydration, s.has_move_over_tag, s.cancelled, s.external_session_id,
                  s.external_document_id, s.picked_by_user_id, s.picked_by_user_name,
                  s.saved_custom_field_2, s.pick_started_at, s.pick_ended_at, s.shipped_at,
                  s.updated_at, st.station_type
           FROM shipments s
           JOIN stations st ON st.id = s.station_id
           WHERE s.decision_subphase = 'NEEDS_SESSION'
             AND s.packaging_type_id IS NOT NULL
             AND s.station_id IS NOT NULL
             AND s.fulfillment_session_id IS NULL
             AND s.shipment_status = 'on_hold'
             AND s.has_move_over_tag = true
             AND s.cancelled = false
             AND ($1::text IS NULL OR st.station_type = $1)
           ORDER BY s.station_id, s.fingerprint_id, s.external_order_number"#,
    )
    .bind(station_type)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| (row_to_shipment(r), r.get::<String, _>("station_type")))
        .collect())
}

/// spec.md §4.9: the repair worker's stale `(shipment, lifecyclePhase)`
/// cohort — shipments stuck `ON_DOCK` whose delivery status code or
/// shipment status has since moved on from `pending`.
pub async fn stale_on_dock_cohort(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Uuid>> {
    let rows = sqlx::query(
        r#"SELECT id FROM shipments
           WHERE lifecycle_phase = 'ON_DOCK'
             AND (delivery_status_code IS DISTINCT FROM 'pending' OR shipment_status <> 'pending')
           ORDER BY id
           LIMIT $1 OFFSET $2"#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.get::<Uuid, _>("id")).collect())
}
