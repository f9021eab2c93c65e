/// spec.md §3 "Product collection mapping" — SKU to collection id, the
/// source of truth for fingerprint categorization.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionMapping {
    pub sku: String,
    pub collection_id: String,
}
