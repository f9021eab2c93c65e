//! Rate-check engine (spec.md §4.7): eligibility gating, candidate
//! selection, and the retrying queue worker around it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::{LabelProviderClient, LabelProviderError, RateCandidate, SharedCache, SharedCacheError};
use crate::domain::{QueueKind, RateCheckStatus, Shipment};
use crate::queue;
use crate::storage;

/// spec.md §5: the "worker coordinator" mutex held before fetching from the
/// label provider while a backfill job is active.
const LABEL_PROVIDER_LOCK_KEY: &str = "fulfillment:rate_check:label_provider";
const LABEL_PROVIDER_LOCK_TTL_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum RateCheckError {
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
    #[error("label provider error: {0}")]
    LabelProvider(#[from] LabelProviderError),
    #[error("shared cache error: {0}")]
    SharedCache(#[from] SharedCacheError),
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
    #[error("not eligible: {0}")]
    NotEligible(String),
    #[error("skipped: label provider coordinator lock is held by a backfill job")]
    CoordinatorLocked,
}

/// spec.md §4.7 "Sync" gate: the five basic requirements the state machine
/// checks to know a shipment is in `NEEDS_RATE_CHECK`.
pub fn sync_eligible(shipment: &Shipment) -> Result<(), &'static str> {
    if shipment.external_shipment_key.is_none() {
        return Err("missing external shipment id");
    }
    if shipment.destination_postal_code.is_none() {
        return Err("missing destination postal code");
    }
    if shipment.service_code.is_none() {
        return Err("missing service code");
    }
    if shipment.fingerprint_id.is_none() {
        return Err("missing fingerprint id");
    }
    if shipment.packaging_type_id.is_none() {
        return Err("missing packaging type id");
    }
    Ok(())
}

/// spec.md §4.7 step 2: infer delivery days from a service code when the
/// provider doesn't report `delivery_days` directly.
fn infer_delivery_days(service_code: &str) -> u32 {
    let lower = service_code.to_ascii_lowercase();
    if lower.contains("overnight") || lower.contains("next_day") {
        1
    } else if lower.contains("priority") || lower.contains("2day") || lower.contains("expedited") {
        2
    } else if lower.contains("3day") {
        3
    } else {
        5
    }
}

pub struct RateAnalysis {
    pub smart_shipping_method: String,
    pub savings: f64,
    pub reasoning: String,
    pub status: RateCheckStatus,
}

/// spec.md §4.7 algorithm steps 1-4, pure once given the candidate list.
pub fn select_smart_rate(
    customer_service_code: &str,
    customer_amount: f64,
    candidates: &[RateCandidate],
    disallowed_services: &[String],
    fingerprint_weight_oz: f64,
) -> RateAnalysis {
    let customer_candidate = candidates.iter().find(|c| c.service_code == customer_service_code);
    let customer_delivery_days = customer_candidate
        .and_then(|c| c.delivery_days)
        .unwrap_or_else(|| infer_delivery_days(customer_service_code));

    if disallowed_services.iter().any(|s| s == customer_service_code) {
        return RateAnalysis {
            smart_shipping_method: customer_service_code.to_string(),
            savings: 0.0,
            reasoning: "customer service not allowed to change".to_string(),
            status: RateCheckStatus::Skipped,
        };
    }

    let mut survivors: Vec<&RateCandidate> = candidates
        .iter()
        .filter(|c| c.service_code != customer_service_code)
        .filter(|c| c.amount > 0.0)
        .filter(|c| c.delivery_days.map(|d| d <= customer_delivery_days).unwrap_or(false))
        .filter(|c| !disallowed_services.iter().any(|s| s == &c.service_code))
        .filter(|c| c.weight_limit_oz.map(|limit| fingerprint_weight_oz <= limit).unwrap_or(true))
        .collect();

    survivors.sort_by(|a, b| a.amount.partial_cmp(&b.amount).unwrap_or(std::cmp::Ordering::Equal));

    match survivors.first() {
        Some(cheapest) if cheapest.amount < customer_amount => RateAnalysis {
            smart_shipping_method: cheapest.service_code.clone(),
            savings: customer_amount - cheapest.amount,
            reasoning: format!(
                "{} is {:.2} cheaper and still meets the {}-day delivery commitment",
                cheapest.service_code,
                customer_amount - cheapest.amount,
                customer_delivery_days
            ),
            status: RateCheckStatus::Complete,
        },
        _ => RateAnalysis {
            smart_shipping_method: customer_service_code.to_string(),
            savings: 0.0,
            reasoning: "customer's choice is the most cost-effective option".to_string(),
            status: RateCheckStatus::Complete,
        },
    }
}

pub struct RateCheckEngine {
    pool: PgPool,
    label_provider: Arc<dyn LabelProviderClient>,
    shared_cache: Arc<dyn SharedCache>,
    disallowed_services: Vec<String>,
    degraded: AtomicBool,
}

impl RateCheckEngine {
    pub fn new(
        pool: PgPool,
        label_provider: Arc<dyn LabelProviderClient>,
        shared_cache: Arc<dyn SharedCache>,
        disallowed_services: Vec<String>,
    ) -> Self {
        Self {
            pool,
            label_provider,
            shared_cache,
            disallowed_services,
            degraded: AtomicBool::new(false),
        }
    }

    /// spec.md §5: true once a poll has been skipped for want of the
    /// coordinator lock, until a subsequent poll acquires it again.
    pub fn degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// spec.md §4.7 "Async (pre-API)" gate plus the full algorithm,
    /// persisting the result as both the shipment's `rateCheckStatus` and
    /// an upserted `rateAnalysis` row keyed on the external shipment id.
    pub async fn analyze_and_save(&self, shipment_id: Uuid) -> Result<RateAnalysis, RateCheckError> {
        let shipment = storage::shipments::get(&self.pool, shipment_id).await?;
        sync_eligible(&shipment).map_err(|reason| RateCheckError::NotEligible(reason.to_string()))?;

        let fingerprint_id = shipment.fingerprint_id.expect("checked by sync_eligible");
        let fingerprint = storage::fingerprints::get(&self.pool, fingerprint_id).await?;
        if fingerprint.total_weight <= 0.0 {
            return Err(RateCheckError::NotEligible("fingerprint has no positive weight".to_string()));
        }

        let model = storage::fingerprints::find_model(&self.pool, fingerprint_id).await?;
        if model.is_none() {
            return Err(RateCheckError::NotEligible("fingerprint has no packaging model".to_string()));
        }

        let external_id = shipment.external_shipment_key.clone().expect("checked by sync_eligible");
        let service_code = shipment.service_code.clone().expect("checked by sync_eligible");

        if !self
            .shared_cache
            .try_acquire_lock(LABEL_PROVIDER_LOCK_KEY, LABEL_PROVIDER_LOCK_TTL_SECS)
            .await?
        {
            if !self.degraded.swap(true, Ordering::Relaxed) {
                warn!(%shipment_id, "label provider coordinator lock held by a backfill job, skipping poll");
            }
            return Err(RateCheckError::CoordinatorLocked);
        }
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!("label provider coordinator lock reacquired, rate check worker recovered");
        }

        let rates_result = self.label_provider.get_rates(&external_id).await;
        self.shared_cache.release_lock(LABEL_PROVIDER_LOCK_KEY).await?;
        let rates = rates_result?;

        let customer_amount = rates
            .candidates
            .iter()
            .find(|c| c.service_code == service_code)
            .map(|c| c.amount)
            .unwrap_or(0.0);

        let analysis = select_smart_rate(
            &service_code,
            customer_amount,
            &rates.candidates,
            &self.disallowed_services,
            fingerprint.total_weight,
        );

        storage::shipments::update_rate_check_status(&self.pool, shipment_id, analysis.status).await?;
        storage::rate_analyses::upsert(
            &self.pool,
            shipment_id,
            &external_id,
            &analysis.smart_shipping_method,
            analysis.savings,
            &analysis.reasoning,
        )
        .await?;

        info!(%shipment_id, method = %analysis.smart_shipping_method, savings = analysis.savings, "rate analysis saved");
        Ok(analysis)
    }

    /// Queue handler entry point: `QueueKind::RateCheck` jobs carry a
    /// shipment id as their correlation key.
    pub async fn run_once(&self, limit: i64) -> Result<usize, RateCheckError> {
        let records = queue::claim_batch(&self.pool, QueueKind::RateCheck, limit).await?;
        let mut handled = 0;
        for record in &records {
            let Ok(shipment_id) = record.correlation_key.parse::<Uuid>() else {
                queue::record_outcome(
                    &self.pool,
                    record,
                    queue::Outcome::Failed { message: "bad correlation key".to_string(), http_status: None },
                )
                .await?;
                continue;
            };

            match self.analyze_and_save(shipment_id).await {
                Ok(_) => {
                    queue::record_outcome(&self.pool, record, queue::Outcome::Completed).await?;
                }
                Err(RateCheckError::LabelProvider(err)) => {
                    warn!(%shipment_id, error = %err, "rate check label-provider call failed");
                    queue::record_outcome(
                        &self.pool,
                        record,
                        queue::Outcome::Failed { message: err.to_string(), http_status: err.http_status() },
                    )
                    .await?;
                }
                Err(RateCheckError::CoordinatorLocked) => {
                    queue::record_outcome(
                        &self.pool,
                        record,
                        queue::Outcome::Failed {
                            message: RateCheckError::CoordinatorLocked.to_string(),
                            http_status: None,
                        },
                    )
                    .await?;
                }
                Err(err) => {
                    queue::record_outcome(
                        &self.pool,
                        record,
                        queue::Outcome::Failed { message: err.to_string(), http_status: None },
                    )
                    .await?;
                }
            }
            handled += 1;
        }
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(service: &str, days: u32, amount: f64) -> RateCandidate {
        RateCandidate {
            service_code: service.to_string(),
            amount,
            delivery_days: Some(days),
            weight_limit_oz: None,
        }
    }

    #[test]
    fn worked_example_s6_keeps_customer_choice() {
        // spec.md S6: usps_priority_mail (2 days, $12.40) vs ups_ground (5
        // days, $9.10, rejected for exceeding the delivery window) and
        // fedex_home_delivery (3 days, $10.00, also too slow).
        let candidates = vec![
            candidate("usps_priority_mail", 2, 12.40),
            candidate("ups_ground", 5, 9.10),
            candidate("fedex_home_delivery", 3, 10.00),
        ];
        let analysis = select_smart_rate("usps_priority_mail", 12.40, &candidates, &[], 0.0);
        assert_eq!(analysis.smart_shipping_method, "usps_priority_mail");
        assert_eq!(analysis.savings, 0.0);
        assert_eq!(analysis.reasoning, "customer's choice is the most cost-effective option");
    }

    #[test]
    fn cheaper_candidate_meeting_delivery_window_wins() {
        let candidates = vec![
            candidate("usps_priority_mail", 2, 12.40),
            candidate("ups_2day", 2, 9.00),
        ];
        let analysis = select_smart_rate("usps_priority_mail", 12.40, &candidates, &[], 0.0);
        assert_eq!(analysis.smart_shipping_method, "ups_2day");
        assert!((analysis.savings - 3.40).abs() < 1e-9);
    }

    #[test]
    fn disallowed_customer_service_is_skipped() {
        let candidates = vec![candidate("usps_priority_mail", 2, 12.40)];
        let analysis = select_smart_rate(
            "usps_priority_mail",
            12.40,
            &candidates,
            &["usps_priority_mail".to_string()],
            0.0,
        );
        assert_eq!(analysis.status, RateCheckStatus::Skipped);
    }

    #[test]
    fn sync_eligibility_reports_first_missing_field() {
        let mut shipment = base_shipment();
        shipment.external_shipment_key = None;
        assert_eq!(sync_eligible(&shipment), Err("missing external shipment id"));
    }

    #[test]
    fn sync_eligibility_passes_with_all_fields() {
        assert!(sync_eligible(&base_shipment()).is_ok());
    }

    fn base_shipment() -> Shipment {
        Shipment {
            id: Uuid::new_v4(),
            external_shipment_key: Some("ext-1".to_string()),
            external_order_number: "ORD-1".to_string(),
            carrier: None,
            service_code: Some("usps_priority_mail".to_string()),
            destination_postal_code: Some("97201".to_string()),
            destination_state: None,
            tracking_number: None,
            shipment_status: crate::domain::ShipmentStatus::from("on_hold"),
            delivery_status_code: None,
            session_status: None,
            lifecycle_phase: None,
            decision_subphase: None,
            fingerprint_status: None,
            fingerprint_id: Some(Uuid::new_v4()),
            packaging_type_id: Some(Uuid::new_v4()),
            station_id: None,
            fulfillment_session_id: None,
            smart_session_spot: None,
            rate_check_status: RateCheckStatus::None,
            proactive_hydration: false,
            has_move_over_tag: true,
            cancelled: false,
            external_session_id: None,
            external_document_id: None,
            picked_by_user_id: None,
            picked_by_user_name: None,
            saved_custom_field_2: None,
            pick_started_at: None,
            pick_ended_at: None,
            shipped_at: None,
            updated_at: chrono::Utc::now(),
        }
    }
}
