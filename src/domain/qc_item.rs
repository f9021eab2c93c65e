use uuid::Uuid;

/// Post-explosion, scan-ready line item (spec.md §3 "QC item (fulfilled)").
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QcItem {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub sku: String,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub expected_quantity: i32,
    pub parent_sku: Option<String>,
    pub is_kit_component: bool,
    pub collection_id: Option<String>,
    pub unit_weight_value: Option<f64>,
    pub unit_weight_unit: Option<String>,
    pub physical_location: Option<String>,
}
