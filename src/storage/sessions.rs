//! Fulfillment session rows (spec.md §4.8, §3 "Fulfillment session").

use chrono::{NaiveDate, Utc};
use sea_query::{Expr, Query};
use sea_query_binder::SqlxBinder;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::schema::FulfillmentSessions;
use super::Result;
use crate::domain::{FulfillmentSession, SessionRowStatus};

fn parse_status(raw: &str) -> SessionRowStatus {
    match raw {
        "ready" => SessionRowStatus::Ready,
        "picking" => SessionRowStatus::Picking,
        "packing" => SessionRowStatus::Packing,
        "completed" => SessionRowStatus::Completed,
        _ => SessionRowStatus::Draft,
    }
}

fn row_to_session(row: &sqlx::postgres::PgRow) -> FulfillmentSession {
    FulfillmentSession {
        id: row.get("id"),
        station_type: row.get("station_type"),
        station_id: row.get("station_id"),
        order_count: row.get("order_count"),
        max_orders: row.get("max_orders"),
        status: parse_status(row.get::<String, _>("status").as_str()),
        sequence_number: row.get("sequence_number"),
        day_key: row.get("day_key"),
        ready_at: row.get("ready_at"),
        picking_at: row.get("picking_at"),
        packing_at: row.get("packing_at"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
    }
}

/// spec.md §4.8 step 3: find the oldest `draft` session for a station that
/// still has room, so the batcher fills sessions in creation order instead
/// of stranding earlier drafts behind newer ones.
pub async fn find_open_draft(
    pool: &PgPool,
    station_id: Uuid,
    day_key: NaiveDate,
) -> Result<Option<FulfillmentSession>> {
    let row = sqlx::query(
        r#"SELECT id, station_type, station_id, order_count, max_orders, status,
                  sequence_number, day_key, ready_at, picking_at, packing_at, completed_at,
                  created_at
           FROM fulfillment_sessions
           WHERE station_id = $1 AND day_key = $2 AND status = 'draft' AND order_count < max_orders
           ORDER BY sequence_number ASC
           LIMIT 1"#,
    )
    .bind(station_id)
    .bind(day_key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| row_to_session(&r)))
}

/// spec.md §4.8 step 4: the next sequence number for a station on a given
/// day, so session identifiers are stable and human-readable
/// (`STATION-DAY-#`).
pub async fn next_sequence_number(pool: &PgPool, station_id: Uuid, day_key: NaiveDate) -> Result<i32> {
    let next: Option<i32> = sqlx::query_scalar(
        "SELECT MAX(sequence_number) FROM fulfillment_sessions WHERE station_id = $1 AND day_key = $2",
    )
    .bind(station_id)
    .bind(day_key)
    .fetch_one(pool)
    .await?;

    Ok(next.unwrap_or(0) + 1)
}

pub async fn create_draft(
    pool: &PgPool,
    station_type: &str,
    station_id: Uuid,
    max_orders: i32,
    day_key: NaiveDate,
    sequence_number: i32,
) -> Result<FulfillmentSession> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO fulfillment_sessions
             (id, station_type, station_id, order_count, max_orders, status, sequence_number,
              day_key, created_at)
           VALUES ($1, $2, $3, 0, $4, 'draft', $5, $6, $7)"#,
    )
    .bind(id)
    .bind(station_type)
    .bind(station_id)
    .bind(max_orders)
    .bind(sequence_number)
    .bind(day_key)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(FulfillmentSession {
        id,
        station_type: station_type.to_string(),
        station_id,
        order_count: 0,
        max_orders,
        status: SessionRowStatus::Draft,
        sequence_number,
        day_key,
        ready_at: None,
        picking_at: None,
        packing_at: None,
        completed_at: None,
        created_at: Utc::now(),
    })
}

/// spec.md §4.8 step 6: increment `orderCount` by the number of shipments
/// just assigned to this session.
pub async fn increment_order_count(pool: &PgPool, id: Uuid, by: i32) -> Result<()> {
    let (sql, values) = Query::update()
        .table(FulfillmentSessions::Table)
        .value(
            FulfillmentSessions::OrderCount,
            Expr::col(FulfillmentSessions::OrderCount).add(by),
        )
        .and_where(Expr::col(FulfillmentSessions::Id).eq(id))
        .build_sqlx(sea_query::PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(pool).await?;
    Ok(())
}

/// spec.md §4.8 step 7: close the session for new assignments and stamp
/// `readyAt` once it is full or the fill window elapses.
pub async fn mark_ready(pool: &PgPool, id: Uuid) -> Result<()> {
    let (sql, values) = Query::update()
        .table(FulfillmentSessions::Table)
        .value(FulfillmentSessions::Status, SessionRowStatus::Ready.as_str())
        .value(FulfillmentSessions::ReadyAt, Utc::now())
        .and_where(Expr::col(FulfillmentSessions::Id).eq(id))
        .build_sqlx(sea_query::PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(pool).await?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<FulfillmentSession> {
    let row = sqlx::query(
        r#"SELECT id, station_type, station_id, order_count, max_orders, status,
                  sequence_number, day_key, ready_at, picking_at, packing_at, completed_at,
                  created_at
           FROM fulfillment_sessions WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(super::StorageError::NotFound("fulfillment_session"))?;

    Ok(row_to_session(&row))
}
