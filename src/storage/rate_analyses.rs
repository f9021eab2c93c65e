//! Rate analysis rows (spec.md §4.7 step 5): the smart-rate recommendation
//! upserted alongside a shipment's own `rate_check_status`.

use sqlx::PgPool;
use uuid::Uuid;

use super::Result;

pub async fn upsert(
    pool: &PgPool,
    shipment_id: Uuid,
    external_shipment_key: &str,
    smart_shipping_method: &str,
    savings: f64,
    reasoning: &str,
) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO rate_analyses
             (id, shipment_id, external_shipment_key, smart_shipping_method, savings, reasoning, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, now())
           ON CONFLICT (external_shipment_key) DO UPDATE SET
             smart_shipping_method = EXCLUDED.smart_shipping_method,
             savings = EXCLUDED.savings,
             reasoning = EXCLUDED.reasoning,
             updated_at = now()"#,
    )
    .bind(Uuid::new_v4())
    .bind(shipment_id)
    .bind(external_shipment_key)
    .bind(smart_shipping_method)
    .bind(savings)
    .bind(reasoning)
    .execute(pool)
    .await?;
    Ok(())
}
