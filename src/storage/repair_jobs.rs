//! Repair job rows (spec.md §4.9): operator-enqueued batched reconcilers.

use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{Result, StorageError};
use crate::domain::{RepairJob, RepairJobStatus};

fn row_to_job(row: &sqlx::postgres::PgRow) -> RepairJob {
    RepairJob {
        id: row.get("id"),
        kind: row.get("kind"),
        status: RepairJobStatus::parse(row.get::<String, _>("status").as_str())
            .expect("unknown repair job status in storage"),
        processed_count: row.get("processed_count"),
        cancel_requested: row.get("cancel_requested"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn enqueue(pool: &PgPool, kind: &str) -> Result<RepairJob> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"INSERT INTO repair_jobs (id, kind, status, processed_count, cancel_requested, created_at, updated_at)
           VALUES ($1, $2, 'pending', 0, false, $3, $3)"#,
    )
    .bind(id)
    .bind(kind)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(RepairJob {
        id,
        kind: kind.to_string(),
        status: RepairJobStatus::Pending,
        processed_count: 0,
        cancel_requested: false,
        last_error: None,
        created_at: now,
        updated_at: now,
    })
}

/// spec.md §4.9: claim one `pending` job and flip it to `running`, guarded
/// by `FOR UPDATE SKIP LOCKED` so multiple repair-worker instances never
/// claim the same job.
pub async fn claim_next(pool: &PgPool) -> Result<Option<RepairJob>> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"SELECT id, kind, status, processed_count, cancel_requested, last_error, created_at, updated_at
           FROM repair_jobs WHERE status = 'pending'
           ORDER BY created_at
           LIMIT 1
           FOR UPDATE SKIP LOCKED"#,
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.commit().await?;
        return Ok(None);
    };

    let id: Uuid = row.get("id");
    sqlx::query("UPDATE repair_jobs SET status = 'running', updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let mut job = row_to_job(&row);
    job.status = RepairJobStatus::Running;
    Ok(Some(job))
}

pub async fn add_processed(pool: &PgPool, id: Uuid, by: i64) -> Result<()> {
    sqlx::query("UPDATE repair_jobs SET processed_count = processed_count + $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(by)
        .execute(pool)
        .await?;
    Ok(())
}

/// spec.md §4.9 "checks cooperative-cancellation between batches".
pub async fn is_cancel_requested(pool: &PgPool, id: Uuid) -> Result<bool> {
    let cancel: bool = sqlx::query_scalar("SELECT cancel_requested FROM repair_jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StorageError::NotFound("repair_job"))?;
    Ok(cancel)
}

pub async fn request_cancel(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE repair_jobs SET cancel_requested = true, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_completed(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE repair_jobs SET status = 'completed', updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_cancelled(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE repair_jobs SET status = 'cancelled', updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, id: Uuid, error: &str) -> Result<()> {
    sqlx::query("UPDATE repair_jobs SET status = 'failed', last_error = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
    Ok(())
}
