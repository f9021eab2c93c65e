//! Product-collection mappings: the fingerprint axis (spec.md §3 "Product
//! collection mapping", §4.2 step 4).

use sqlx::{PgPool, Row};

use super::Result;
use crate::domain::CollectionMapping;

pub async fn get_for_skus(pool: &PgPool, skus: &[String]) -> Result<Vec<CollectionMapping>> {
    if skus.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query("SELECT sku, collection_id FROM product_collection_mappings WHERE sku = ANY($1)")
        .bind(skus)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|r| CollectionMapping {
            sku: r.get("sku"),
            collection_id: r.get("collection_id"),
        })
        .collect())
}

/// spec.md §4.2 `onCollectionChanged(affectedSkus)`: shipments whose QC
/// items reference any of the given SKUs and which have not yet shipped.
pub async fn unshipped_shipment_ids_referencing_skus(
    pool: &PgPool,
    skus: &[String],
) -> Result<Vec<uuid::Uuid>> {
    if skus.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(
        r#"SELECT DISTINCT q.shipment_id FROM qc_items q
           JOIN shipments s ON s.id = q.shipment_id
           WHERE q.sku = ANY($1) AND s.shipped_at IS NULL"#,
    )
    .bind(skus)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.get::<uuid::Uuid, _>("shipment_id")).collect())
}
