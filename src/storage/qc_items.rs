//! QC item rows: the post-explosion, scan-ready line items the fingerprint
//! engine writes (spec.md §4.2 step 5, §3 "QC item (fulfilled)").

use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::Result;
use crate::domain::QcItem;

/// Replace every QC item for a shipment with a freshly exploded set
/// (spec.md §4.2 step 8: re-hydration discards and rebuilds rather than
/// diffing, since explosion is cheap and idempotent per run).
pub async fn replace_for_shipment(pool: &PgPool, shipment_id: Uuid, items: &[QcItem]) -> super::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM qc_items WHERE shipment_id = $1")
        .bind(shipment_id)
        .execute(&mut *tx)
        .await?;

    for item in items {
        sqlx::query(
            r#"INSERT INTO qc_items
                 (id, shipment_id, sku, barcode, image_url, expected_quantity, parent_sku,
                  is_kit_component, collection_id, unit_weight_value, unit_weight_unit,
                  physical_location)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
        )
        .bind(item.id)
        .bind(item.shipment_id)
        .bind(&item.sku)
        .bind(&item.barcode)
        .bind(&item.image_url)
        .bind(item.expected_quantity)
        .bind(&item.parent_sku)
        .bind(item.is_kit_component)
        .bind(&item.collection_id)
        .bind(item.unit_weight_value)
        .bind(&item.unit_weight_unit)
        .bind(&item.physical_location)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn list_for_shipment(pool: &PgPool, shipment_id: Uuid) -> Result<Vec<QcItem>> {
    let rows = sqlx::query(
        r#"SELECT id, shipment_id, sku, barcode, image_url, expected_quantity, parent_sku,
                  is_kit_component, collection_id, unit_weight_value, unit_weight_unit,
                  physical_location
           FROM qc_items WHERE shipment_id = $1"#,
    )
    .bind(shipment_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| QcItem {
            id: r.get("id"),
            shipment_id: r.get("shipment_id"),
            sku: r.get("sku"),
            barcode: r.get("barcode"),
            image_url: r.get("image_url"),
            expected_quantity: r.get("expected_quantity"),
            parent_sku: r.get("parent_sku"),
            is_kit_component: r.get("is_kit_component"),
            collection_id: r.get("collection_id"),
            unit_weight_value: r.get("unit_weight_value"),
            unit_weight_unit: r.get("unit_weight_unit"),
            physical_location: r.get("physical_location"),
        })
        .collect())
}

/// spec.md §4.2 step 8 ("repairUnexplodedKits"): shipments whose QC items
/// still contain a kit SKU that was never expanded into components.
pub async fn shipment_ids_with_unexploded_kits(pool: &PgPool, limit: i64) -> Result<Vec<Uuid>> {
    let rows = sqlx::query(
        r#"SELECT DISTINCT q.shipment_id FROM qc_items q
           WHERE q.is_kit_component = false
             AND EXISTS (SELECT 1 FROM kit_mappings k WHERE k.parent_sku = q.sku)
           LIMIT $1"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.get::<Uuid, _>("shipment_id")).collect())
}

/// spec.md §4.2 step 8 ("repairUnsubstitutedVariants"): the symmetric case
/// of `shipment_ids_with_unexploded_kits` — a QC item whose SKU is a known
/// variant (has a `parentSku` in `products`) but was kept as-is instead of
/// being rolled up to its parent.
pub async fn shipment_ids_missing_collection(pool: &PgPool, limit: i64) -> Result<Vec<Uuid>> {
    let rows = sqlx::query(
        r#"SELECT DISTINCT q.shipment_id FROM qc_items q
           WHERE EXISTS (
             SELECT 1 FROM products p WHERE p.sku = q.sku AND p.parent_sku IS NOT NULL
           )
           LIMIT $1"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.get::<Uuid, _>("shipment_id")).collect())
}
