//! Durable at-least-once queue rows shared by the three named queues
//! (spec.md §4.4, §3 "Durable-queue record").

use chrono::{DateTime, Utc};
use sea_query::{Expr, Query};
use sea_query_binder::SqlxBinder;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::schema::QueueRecords;
use super::{Result, StorageError};
use crate::domain::{QueueKind, QueueRecord, QueueStatus};

fn row_to_record(row: &sqlx::postgres::PgRow) -> QueueRecord {
    QueueRecord {
        id: row.get("id"),
        kind: QueueKind::parse(row.get::<String, _>("kind").as_str()).expect("unknown queue kind in storage"),
        correlation_key: row.get("correlation_key"),
        payload: row.get("payload"),
        status: QueueStatus::parse(row.get::<String, _>("status").as_str())
            .expect("unknown queue status in storage"),
        retry_count: row.get("retry_count"),
        max_retries: row.get("max_retries"),
        next_retry_at: row.get("next_retry_at"),
        last_error: row.get("last_error"),
        last_http_status: row.get("last_http_status"),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
    }
}

/// spec.md §4.4: enqueue a unit of work. For `QcExplosion`, `correlation_key`
/// is the shipment id and a partial unique index on
/// `(kind, correlation_key) WHERE status IN ('queued', 'processing')`
/// de-duplicates concurrent enqueues of the same shipment.
pub async fn enqueue(
    pool: &PgPool,
    kind: QueueKind,
    correlation_key: &str,
    payload: serde_json::Value,
    max_retries: i32,
) -> Result<QueueRecord> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let inserted = sqlx::query(
        r#"INSERT INTO queue_records
             (id, kind, correlation_key, payload, status, retry_count, max_retries,
              next_retry_at, created_at)
           VALUES ($1, $2, $3, $4, 'queued', 0, $5, $6, $6)
           ON CONFLICT (kind, correlation_key) WHERE status IN ('queued', 'processing') DO NOTHING
           RETURNING id, kind, correlation_key, payload, status, retry_count, max_retries,
                     next_retry_at, last_error, last_http_status, processed_at, created_at"#,
    )
    .bind(id)
    .bind(kind.as_str())
    .bind(correlation_key)
    .bind(&payload)
    .bind(max_retries)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(row) => Ok(row_to_record(&row)),
        None => find_active_by_correlation(pool, kind, correlation_key)
            .await?
            .ok_or(StorageError::Conflict("queue_records dedup race")),
    }
}

async fn find_active_by_correlation(
    pool: &PgPool,
    kind: QueueKind,
    correlation_key: &str,
) -> Result<Option<QueueRecord>> {
    let row = sqlx::query(
        r#"SELECT id, kind, correlation_key, payload, status, retry_count, max_retries,
                  next_retry_at, last_error, last_http_status, processed_at, created_at
           FROM queue_records
           WHERE kind = $1 AND correlation_key = $2 AND status IN ('queued', 'processing')
           ORDER BY created_at DESC LIMIT 1"#,
    )
    .bind(kind.as_str())
    .bind(correlation_key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| row_to_record(&r)))
}

/// spec.md §4.4: claim up to `limit` due records of a given kind, marking
/// them `processing` atomically via `FOR UPDATE SKIP LOCKED` so concurrent
/// worker instances never double-process the same row.
pub async fn claim_batch(pool: &PgPool, kind: QueueKind, limit: i64) -> Result<Vec<QueueRecord>> {
    let mut tx = pool.begin().await?;

    let rows = sqlx::query(
        r#"SELECT id, kind, correlation_key, payload, status, retry_count, max_retries,
                  next_retry_at, last_error, last_http_status, processed_at, created_at
           FROM queue_records
           WHERE kind = $1 AND status = 'queued' AND next_retry_at <= now()
           ORDER BY created_at
           LIMIT $2
           FOR UPDATE SKIP LOCKED"#,
    )
    .bind(kind.as_str())
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.get::<Uuid, _>("id")).collect();
    let claimed_at = Utc::now();
    if !ids.is_empty() {
        sqlx::query("UPDATE queue_records SET status = 'processing', processed_at = $2 WHERE id = ANY($1)")
            .bind(&ids)
            .bind(claimed_at)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let mut record = row_to_record(&r);
            record.status = QueueStatus::Processing;
            record.processed_at = Some(claimed_at);
            record
        })
        .collect())
}

pub async fn mark_completed(pool: &PgPool, id: Uuid) -> Result<()> {
    let (sql, values) = Query::update()
        .table(QueueRecords::Table)
        .value(QueueRecords::Status, QueueStatus::Completed.as_str())
        .and_where(Expr::col(QueueRecords::Id).eq(id))
        .build_sqlx(sea_query::PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(pool).await?;
    Ok(())
}

/// spec.md §4.4: on failure, bump `retry_count`, schedule `next_retry_at`
/// via the caller-computed backoff, and dead-letter once `retry_count`
/// exceeds `max_retries`.
pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    error: &str,
    http_status: Option<i32>,
    next_retry_at: DateTime<Utc>,
    retry_count: i32,
    max_retries: i32,
) -> Result<()> {
    let status = if retry_count > max_retries {
        QueueStatus::DeadLetter
    } else {
        QueueStatus::Queued
    };

    let (sql, values) = Query::update()
        .table(QueueRecords::Table)
        .value(QueueRecords::Status, status.as_str())
        .value(QueueRecords::RetryCount, retry_count)
        .value(QueueRecords::NextRetryAt, next_retry_at)
        .value(QueueRecords::LastError, error)
        .value(QueueRecords::LastHttpStatus, http_status)
        .and_where(Expr::col(QueueRecords::Id).eq(id))
        .build_sqlx(sea_query::PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(pool).await?;
    Ok(())
}

/// spec.md §4.4: rows stuck `processing` past the stale threshold are
/// assumed to belong to a crashed worker and are recovered back to `queued`
/// without incrementing `retry_count` (the attempt never truly ran to
/// completion or failure). Measured from `processed_at`, the moment a row
/// was claimed, not `created_at` — a row can sit `queued` in a normal
/// backlog far longer than the stale threshold without being stuck.
pub async fn recover_stale_processing(pool: &PgPool, older_than: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"UPDATE queue_records SET status = 'queued'
           WHERE status = 'processing' AND processed_at < $1"#,
    )
    .bind(older_than)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<QueueRecord> {
    let row = sqlx::query(
        r#"SELECT id, kind, correlation_key, payload, status, retry_count, max_retries,
                  next_retry_at, last_error, last_http_status, processed_at, created_at
           FROM queue_records WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(StorageError::NotFound("queue_record"))?;

    Ok(row_to_record(&row))
}
