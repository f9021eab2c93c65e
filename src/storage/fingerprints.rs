//! Fingerprint and fingerprint-model rows (spec.md §4.2 step 7, §3).

use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::Result;
use crate::domain::{Fingerprint, FingerprintModel};

/// spec.md §4.2 step 7: find an existing fingerprint by `signatureHash`, or
/// insert a new one. Relies on the unique constraint on `signature_hash` to
/// resolve the race between two shipments hydrating the same signature
/// concurrently (spec.md §8 property 1).
pub async fn find_or_create(pool: &PgPool, fingerprint: &Fingerprint) -> Result<Fingerprint> {
    if let Some(existing) = find_by_hash(pool, &fingerprint.signature_hash).await? {
        return Ok(existing);
    }

    let inserted = sqlx::query(
        r#"INSERT INTO fingerprints
             (id, signature, signature_hash, display_name, item_count, total_weight, weight_unit)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           ON CONFLICT (signature_hash) DO NOTHING
           RETURNING id, signature, signature_hash, display_name, item_count, total_weight, weight_unit"#,
    )
    .bind(fingerprint.id)
    .bind(&fingerprint.signature)
    .bind(&fingerprint.signature_hash)
    .bind(&fingerprint.display_name)
    .bind(fingerprint.item_count)
    .bind(fingerprint.total_weight)
    .bind(&fingerprint.weight_unit)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(row) => Ok(row_to_fingerprint(&row)),
        None => find_by_hash(pool, &fingerprint.signature_hash)
            .await?
            .ok_or(super::StorageError::NotFound("fingerprint")),
    }
}

pub async fn find_by_hash(pool: &PgPool, signature_hash: &str) -> Result<Option<Fingerprint>> {
    let row = sqlx::query(
        r#"SELECT id, signature, signature_hash, display_name, item_count, total_weight, weight_unit
           FROM fingerprints WHERE signature_hash = $1"#,
    )
    .bind(signature_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| row_to_fingerprint(&r)))
}

fn row_to_fingerprint(row: &sqlx::postgres::PgRow) -> Fingerprint {
    Fingerprint {
        id: row.get("id"),
        signature: row.get("signature"),
        signature_hash: row.get("signature_hash"),
        display_name: row.get("display_name"),
        item_count: row.get("item_count"),
        total_weight: row.get("total_weight"),
        weight_unit: row.get("weight_unit"),
    }
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Fingerprint> {
    let row = sqlx::query(
        "SELECT id, signature, signature_hash, display_name, item_count, total_weight, weight_unit FROM fingerprints WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(super::StorageError::NotFound("fingerprint"))?;

    Ok(row_to_fingerprint(&row))
}

/// spec.md §4.2 step 7: a fingerprint model records the packaging decision
/// once made for a given fingerprint; absence means `NEEDS_PACKAGING`.
pub async fn find_model(pool: &PgPool, fingerprint_id: Uuid) -> Result<Option<FingerprintModel>> {
    let row = sqlx::query(
        "SELECT id, fingerprint_id, packaging_type_id FROM fingerprint_models WHERE fingerprint_id = $1",
    )
    .bind(fingerprint_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| FingerprintModel {
        id: r.get("id"),
        fingerprint_id: r.get("fingerprint_id"),
        packaging_type_id: r.get("packaging_type_id"),
    }))
}

pub async fn upsert_model(pool: &PgPool, model: &FingerprintModel) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO fingerprint_models (id, fingerprint_id, packaging_type_id)
           VALUES ($1, $2, $3)
           ON CONFLICT (fingerprint_id) DO UPDATE SET packaging_type_id = EXCLUDED.packaging_type_id"#,
    )
    .bind(model.id)
    .bind(model.fingerprint_id)
    .bind(model.packaging_type_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// spec.md §4.2 step 8 ("backfillFingerprints"): shipments whose
/// `fingerprintStatus` is `null`, `needs_recalc`, `missing_weight`, or
/// `pending_categorization`, plus any whose current fingerprint was hashed
/// with a placeholder zero weight.
pub async fn shipment_ids_for_backfill(pool: &PgPool, limit: i64) -> Result<Vec<Uuid>> {
    let rows = sqlx::query(
        r#"SELECT s.id FROM shipments s
           LEFT JOIN fingerprints f ON f.id = s.fingerprint_id
           WHERE s.fingerprint_status IS NULL
              OR s.fingerprint_status IN ('needs_recalc', 'missing_weight', 'pending_categorization')
              OR f.total_weight <= 0
           LIMIT $1"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.get::<Uuid, _>("id")).collect())
}

/// spec.md §4.2 step 8 ("repairMissingWeightShipments"): shipments stuck
/// specifically in `missing_weight`, narrower than the backfill cohort —
/// their component products may have since acquired weight data.
pub async fn shipment_ids_stuck_missing_weight(pool: &PgPool, limit: i64) -> Result<Vec<Uuid>> {
    let rows = sqlx::query(
        r#"SELECT id FROM shipments WHERE fingerprint_status = 'missing_weight' LIMIT $1"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.get::<Uuid, _>("id")).collect())
}
