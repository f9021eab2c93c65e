//! Lifecycle event worker (spec.md §4.5).
//!
//! Consumes the `LifecycleEvent` queue, re-derives `(phase, subphase)`
//! against the current row, persists on change, and fires the one
//! registered side effect (`NEEDS_RATE_CHECK`) inline.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{DecisionSubphase, QueueKind};
use crate::lifecycle::{self, LifecycleInputs, LifecycleState};
use crate::queue;
use crate::storage;
use crate::workers::rate_check::RateCheckEngine;

const POLL_BUSY: Duration = Duration::from_secs(2);
const POLL_IDLE: Duration = Duration::from_secs(10);
const SIDE_EFFECT_GUARD_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum LifecycleWorkerError {
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
}

/// A typed before/after report for one lifecycle evaluation (spec.md §4.5
/// "emit a typed `LifecycleUpdateResult`").
#[derive(Debug, Clone)]
pub struct LifecycleUpdateResult {
    pub shipment_id: Uuid,
    pub previous: Option<LifecycleState>,
    pub new: LifecycleState,
    pub changed: bool,
}

pub struct LifecycleWorker {
    pool: PgPool,
    rate_check: Arc<RateCheckEngine>,
    batch_size: usize,
    processed_count: std::sync::atomic::AtomicU64,
    side_effects_triggered: std::sync::atomic::AtomicU64,
    errors_count: std::sync::atomic::AtomicU64,
}

impl LifecycleWorker {
    pub fn new(pool: PgPool, rate_check: Arc<RateCheckEngine>, batch_size: usize) -> Self {
        Self {
            pool,
            rate_check,
            batch_size,
            processed_count: std::sync::atomic::AtomicU64::new(0),
            side_effects_triggered: std::sync::atomic::AtomicU64::new(0),
            errors_count: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// spec.md §5 "Global counters ... observed through a status RPC".
    pub fn processed_count(&self) -> u64 {
        self.processed_count.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub async fn run(&self) {
        info!(batch_size = self.batch_size, "starting lifecycle event worker");
        loop {
            let processed = match self.run_once().await {
                Ok(n) => n,
                Err(err) => {
                    self.errors_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    error!(error = %err, "lifecycle worker iteration failed");
                    0
                }
            };

            if processed > 0 {
                tokio::time::sleep(POLL_BUSY).await;
            } else {
                tokio::time::sleep(POLL_IDLE).await;
            }
        }
    }

    async fn run_once(&self) -> Result<usize, LifecycleWorkerError> {
        let records = queue::claim_batch(&self.pool, QueueKind::LifecycleEvent, self.batch_size as i64).await?;
        for record in &records {
            let shipment_id: Uuid = match record.correlation_key.parse() {
                Ok(id) => id,
                Err(_) => {
                    queue::record_outcome(
                        &self.pool,
                        record,
                        queue::Outcome::Failed {
                            message: "correlation key is not a valid shipment id".to_string(),
                            http_status: None,
                        },
                    )
                    .await?;
                    continue;
                }
            };

            match self.evaluate(shipment_id).await {
                Ok(_) => {
                    queue::record_outcome(&self.pool, record, queue::Outcome::Completed).await?;
                    self.processed_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                Err(err) => {
                    warn!(%shipment_id, error = %err, "lifecycle evaluation failed");
                    queue::record_outcome(
                        &self.pool,
                        record,
                        queue::Outcome::Failed {
                            message: err.to_string(),
                            http_status: None,
                        },
                    )
                    .await?;
                }
            }
        }
        Ok(records.len())
    }

    async fn evaluate(&self, shipment_id: Uuid) -> Result<LifecycleUpdateResult, LifecycleWorkerError> {
        let shipment = storage::shipments::get(&self.pool, shipment_id).await?;
        let has_fingerprint_model = if let Some(fingerprint_id) = shipment.fingerprint_id {
            storage::fingerprints::find_model(&self.pool, fingerprint_id).await?.is_some()
        } else {
            false
        };

        let inputs = LifecycleInputs::from_shipment(&shipment, has_fingerprint_model);
        let new_state = lifecycle::derive(&inputs);

        let previous = shipment.lifecycle_phase.map(|phase| LifecycleState {
            phase,
            subphase: shipment.decision_subphase,
        });

        let changed = previous != Some(new_state);

        if !changed {
            return Ok(LifecycleUpdateResult {
                shipment_id,
                previous,
                new: new_state,
                changed: false,
            });
        }

        if let Some(prev) = previous {
            if !lifecycle::is_allowed_phase_transition(prev.phase, new_state.phase) {
                warn!(%shipment_id, from = ?prev.phase, to = ?new_state.phase, "refusing disallowed lifecycle transition");
                return Ok(LifecycleUpdateResult {
                    shipment_id,
                    previous,
                    new: prev,
                    changed: false,
                });
            }
        }

        storage::shipments::update_lifecycle(&self.pool, shipment_id, new_state.phase, new_state.subphase).await?;

        debug!(%shipment_id, from = ?previous, to = ?new_state, "lifecycle transition persisted");

        if new_state.subphase == Some(DecisionSubphase::NeedsSession)
            && lifecycle::needs_rate_check(&new_state, shipment.rate_check_status)
        {
            tokio::time::sleep(SIDE_EFFECT_GUARD_DELAY).await;
            self.side_effects_triggered.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            if let Err(err) = self.rate_check.analyze_and_save(shipment_id).await {
                // spec.md §4.5: "Errors from the side effect are logged but
                // do not re-queue; the state transition itself is already
                // persisted."
                error!(%shipment_id, error = %err, "rate-check side effect failed");
            }
        }

        Ok(LifecycleUpdateResult {
            shipment_id,
            previous,
            new: new_state,
            changed: true,
        })
    }
}
