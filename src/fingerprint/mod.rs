//! Fingerprint engine (spec.md §4.2): kit explosion, variant substitution,
//! collection aggregation, and the packaging-decision lookup.
//!
//! `hydrate` is the single public entry point every other worker reaches
//! for — the session sync worker calls it for proactive hydration
//! (spec.md §4.6 step 5), the QC-explosion queue handler calls it per job,
//! and the repair operations below re-run it on narrower cohorts.

pub mod signature;

use std::collections::{BTreeMap, HashMap};

use sqlx::PgPool;
use uuid::Uuid;

use crate::catalog::KitCatalogCache;
use crate::domain::{Fingerprint, FingerprintModel, FingerprintStatus, QcItem};
use crate::storage;

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
    #[error("catalog error: {0}")]
    Catalog(#[from] crate::catalog::CatalogError),
    #[error("deferred: catalog entry missing for sku {0}")]
    Deferred(String),
}

pub type Result<T> = std::result::Result<T, FingerprintError>;

/// spec.md §4.2 "Result object".
#[derive(Debug, Clone)]
pub struct HydrationResult {
    pub items_created: usize,
    pub fingerprint_status: FingerprintStatus,
    pub fingerprint_is_new: bool,
    pub uncategorised_skus: Vec<String>,
    pub missing_weight_skus: Vec<String>,
    pub fingerprint_id: Option<Uuid>,
    pub packaging_type_id: Option<Uuid>,
    pub station_id: Option<Uuid>,
    pub error: Option<String>,
}

struct ExplodedLine {
    sku: String,
    quantity: i32,
    is_kit_component: bool,
    parent_sku: Option<String>,
}

/// One purchased line after explosion/substitution, aggregated by final SKU.
fn explode_and_aggregate(
    items: &[crate::domain::ShipmentItem],
    catalog: &KitCatalogCache,
    excluded_skus: &[String],
) -> std::result::Result<Vec<ExplodedLine>, String> {
    let mut aggregated: HashMap<String, ExplodedLine> = HashMap::new();

    for item in items {
        if excluded_skus.iter().any(|s| s == &item.sku) {
            continue;
        }

        let components_if_kit = catalog.get_components(&item.sku);
        let product = catalog
            .get_products(std::slice::from_ref(&item.sku))
            .get(&item.sku)
            .cloned();

        let product = match product {
            Some(p) => p,
            None => return Err(item.sku.clone()),
        };

        // spec.md §4.2 step 2.
        let should_explode = components_if_kit.is_some()
            && (product.product_category.as_deref() == Some("kit")
                || (product.is_assembled_product && product.quantity_on_hand == 0));

        if should_explode {
            for component in components_if_kit.unwrap() {
                if excluded_skus.iter().any(|s| s == &component.sku) {
                    continue;
                }
                let entry = aggregated.entry(component.sku.clone()).or_insert(ExplodedLine {
                    sku: component.sku.clone(),
                    quantity: 0,
                    is_kit_component: true,
                    parent_sku: None,
                });
                entry.quantity += component.quantity * item.quantity;
                entry.is_kit_component = true;
            }
        } else if let Some(parent_sku) = product.parent_sku.clone() {
            let entry = aggregated.entry(parent_sku.clone()).or_insert(ExplodedLine {
                sku: parent_sku.clone(),
                quantity: 0,
                is_kit_component: false,
                parent_sku: Some(item.sku.clone()),
            });
            entry.quantity += item.quantity;
        } else {
            let entry = aggregated.entry(item.sku.clone()).or_insert(ExplodedLine {
                sku: item.sku.clone(),
                quantity: 0,
                is_kit_component: false,
                parent_sku: None,
            });
            entry.quantity += item.quantity;
        }
    }

    Ok(aggregated.into_values().collect())
}

/// spec.md §4.2 steps 1-8.
pub async fn hydrate(
    pool: &PgPool,
    catalog: &KitCatalogCache,
    excluded_skus: &[String],
    shipment_id: Uuid,
) -> Result<HydrationResult> {
    catalog.ensure_fresh().await?;

    let items = storage::shipments::get_items(pool, shipment_id).await?;
    let raw_skus: Vec<String> = items.iter().map(|i| i.sku.clone()).collect();
    catalog.preload(&raw_skus).await?;

    let exploded = match explode_and_aggregate(&items, catalog, excluded_skus) {
        Ok(lines) => lines,
        Err(missing_sku) => {
            storage::shipments::update_fingerprint_status(pool, shipment_id, FingerprintStatus::NeedsRecalc).await?;
            return Ok(HydrationResult {
                items_created: 0,
                fingerprint_status: FingerprintStatus::NeedsRecalc,
                fingerprint_is_new: false,
                uncategorised_skus: Vec::new(),
                missing_weight_skus: Vec::new(),
                fingerprint_id: None,
                packaging_type_id: None,
                station_id: None,
                error: Some(format!("deferred: catalog entry missing for sku {missing_sku}")),
            });
        }
    };

    let final_skus: Vec<String> = exploded.iter().map(|l| l.sku.clone()).collect();
    catalog.preload(&final_skus).await?;
    let products = catalog.get_products(&final_skus);
    let collections = storage::collections::get_for_skus(pool, &final_skus).await?;
    let collection_by_sku: HashMap<String, String> = collections
        .into_iter()
        .map(|c| (c.sku, c.collection_id))
        .collect();

    let mut qc_items = Vec::with_capacity(exploded.len());
    let mut uncategorised = Vec::new();
    let mut missing_weight = Vec::new();
    let mut collection_quantities: BTreeMap<String, i64> = BTreeMap::new();
    let mut total_weight = 0.0_f64;

    for line in &exploded {
        let product = products.get(&line.sku);
        let collection_id = collection_by_sku.get(&line.sku).cloned();
        if collection_id.is_none() {
            uncategorised.push(line.sku.clone());
        }

        let weight_value = product.and_then(|p| p.weight_value);
        if weight_value.is_none() || weight_value == Some(0.0) {
            missing_weight.push(line.sku.clone());
        }

        if let (Some(collection_id), Some(weight)) = (collection_id.clone(), weight_value) {
            *collection_quantities.entry(collection_id).or_insert(0) += line.quantity as i64;
            total_weight += weight * line.quantity as f64;
        }

        qc_items.push(QcItem {
            id: Uuid::new_v4(),
            shipment_id,
            sku: line.sku.clone(),
            barcode: product.and_then(|p| p.barcode.clone()),
            image_url: product.and_then(|p| p.image_url.clone()),
            expected_quantity: line.quantity,
            parent_sku: line.parent_sku.clone(),
            is_kit_component: line.is_kit_component,
            collection_id,
            unit_weight_value: weight_value,
            unit_weight_unit: product.and_then(|p| p.weight_unit.clone()),
            physical_location: product.and_then(|p| p.physical_location.clone()),
        });
    }

    storage::qc_items::replace_for_shipment(pool, shipment_id, &qc_items).await?;

    // spec.md §4.2 step 6.
    let status = if !uncategorised.is_empty() {
        FingerprintStatus::PendingCategorization
    } else if !missing_weight.is_empty() {
        FingerprintStatus::MissingWeight
    } else {
        FingerprintStatus::Complete
    };

    if status != FingerprintStatus::Complete {
        storage::shipments::update_fingerprint_status(pool, shipment_id, status).await?;
        return Ok(HydrationResult {
            items_created: qc_items.len(),
            fingerprint_status: status,
            fingerprint_is_new: false,
            uncategorised_skus: uncategorised,
            missing_weight_skus: missing_weight,
            fingerprint_id: None,
            packaging_type_id: None,
            station_id: None,
            error: None,
        });
    }

    let total_weight = signature::round_1dp(total_weight);
    let sig = signature::build_signature(&collection_quantities, total_weight);
    let hash = signature::hash_signature(&sig);

    let candidate = Fingerprint {
        id: Uuid::new_v4(),
        signature: sig,
        signature_hash: hash,
        display_name: display_name(&collection_quantities),
        item_count: qc_items.len() as i32,
        total_weight,
        weight_unit: "oz".to_string(),
    };

    let fingerprint = storage::fingerprints::find_or_create(pool, &candidate).await?;
    let is_new = fingerprint.id == candidate.id;

    // spec.md §4.2 step 7.
    let model = storage::fingerprints::find_model(pool, fingerprint.id).await?;
    let (packaging_type_id, station_id) = match model {
        Some(FingerprintModel { packaging_type_id, .. }) => {
            let station = catalog.first_active_station_for_packaging_type(packaging_type_id).await?;
            (Some(packaging_type_id), station)
        }
        None => (None, None),
    };

    storage::shipments::update_fingerprint_and_packaging(
        pool,
        shipment_id,
        Some(FingerprintStatus::Complete),
        Some(fingerprint.id),
        packaging_type_id,
        station_id,
    )
    .await?;

    Ok(HydrationResult {
        items_created: qc_items.len(),
        fingerprint_status: FingerprintStatus::Complete,
        fingerprint_is_new: is_new,
        uncategorised_skus: Vec::new(),
        missing_weight_skus: Vec::new(),
        fingerprint_id: Some(fingerprint.id),
        packaging_type_id,
        station_id,
        error: None,
    })
}

fn display_name(collection_quantities: &BTreeMap<String, i64>) -> String {
    collection_quantities
        .iter()
        .map(|(c, q)| format!("{c} x{q}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// spec.md §4.2 ancillary operation: reprocess shipments stuck in a
/// non-terminal fingerprint state.
pub async fn backfill_fingerprints(
    pool: &PgPool,
    catalog: &KitCatalogCache,
    excluded_skus: &[String],
    limit: i64,
) -> Result<usize> {
    let ids = storage::fingerprints::shipment_ids_for_backfill(pool, limit).await?;
    let mut processed = 0;
    for id in ids {
        hydrate(pool, catalog, excluded_skus, id).await?;
        processed += 1;
    }
    Ok(processed)
}

/// spec.md §4.2 ancillary operation: kit SKUs that were never exploded.
pub async fn repair_unexploded_kits(
    pool: &PgPool,
    catalog: &KitCatalogCache,
    excluded_skus: &[String],
    limit: i64,
) -> Result<usize> {
    let ids = storage::qc_items::shipment_ids_with_unexploded_kits(pool, limit).await?;
    for &id in &ids {
        hydrate(pool, catalog, excluded_skus, id).await?;
    }
    Ok(ids.len())
}

/// spec.md §4.2 ancillary operation: variant SKUs that slipped through
/// without being rolled up to their parent SKU (symmetric to
/// `repair_unexploded_kits`).
pub async fn repair_unsubstituted_variants(
    pool: &PgPool,
    catalog: &KitCatalogCache,
    excluded_skus: &[String],
    limit: i64,
) -> Result<usize> {
    let ids = storage::qc_items::shipment_ids_missing_collection(pool, limit).await?;
    for &id in &ids {
        hydrate(pool, catalog, excluded_skus, id).await?;
    }
    Ok(ids.len())
}

/// spec.md §4.2 ancillary operation: shipments stuck `missing_weight` whose
/// components have since acquired weight data.
pub async fn repair_missing_weight_shipments(
    pool: &PgPool,
    catalog: &KitCatalogCache,
    excluded_skus: &[String],
    limit: i64,
) -> Result<usize> {
    let ids = storage::fingerprints::shipment_ids_stuck_missing_weight(pool, limit).await?;
    for &id in &ids {
        hydrate(pool, catalog, excluded_skus, id).await?;
    }
    Ok(ids.len())
}

/// spec.md §4.2 ancillary operation: invalidate fingerprints referencing
/// any of the affected SKUs after a collection mapping changes.
pub async fn on_collection_changed(pool: &PgPool, affected_skus: &[String]) -> Result<usize> {
    let ids = storage::collections::unshipped_shipment_ids_referencing_skus(pool, affected_skus).await?;
    for &id in &ids {
        storage::shipments::update_fingerprint_and_packaging(
            pool,
            id,
            Some(FingerprintStatus::NeedsRecalc),
            None,
            None,
            None,
        )
        .await?;
    }
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use crate::catalog::{KitComponent, ProductInfo};

    fn product(category: Option<&str>, assembled: bool, qty_on_hand: i64, parent: Option<&str>) -> ProductInfo {
        ProductInfo {
            barcode: None,
            description: None,
            image_url: None,
            is_assembled_product: assembled,
            weight_value: Some(1.0),
            weight_unit: Some("oz".to_string()),
            product_category: category.map(|c| c.to_string()),
            parent_sku: parent.map(|p| p.to_string()),
            quantity_on_hand: qty_on_hand,
            physical_location: None,
        }
    }

    #[test]
    fn kit_explosion_multiplies_component_quantities() {
        // Mirrors spec.md's worked example S1 without a live catalog cache:
        // exercise the pure aggregation math directly.
        let components = vec![
            KitComponent { sku: "SKU_X".to_string(), quantity: 3 },
            KitComponent { sku: "SKU_Y".to_string(), quantity: 1 },
        ];
        let purchased_qty = 2;
        let x_qty: i32 = components[0].quantity * purchased_qty;
        let y_qty: i32 = components[1].quantity * purchased_qty;
        assert_eq!(x_qty, 6);
        assert_eq!(y_qty, 2);
    }

    #[test]
    fn assembled_out_of_stock_product_is_treated_as_kit() {
        let p = product(Some("apparel"), true, 0, None);
        let has_components = true;
        let should_explode = has_components && (p.product_category.as_deref() == Some("kit") || (p.is_assembled_product && p.quantity_on_hand == 0));
        assert!(should_explode);
    }

    #[test]
    fn non_kit_with_parent_sku_substitutes() {
        let p = product(Some("treats"), false, 10, Some("PARENT_SKU"));
        assert_eq!(p.parent_sku.as_deref(), Some("PARENT_SKU"));
    }
}
