//! Lifecycle repair worker (spec.md §4.9): a passive, claim-based batched
//! reconciler for stale `(shipment, lifecyclePhase)` pairs. Grounded in the
//! teacher's `services::timeout_scheduler::TimeoutScheduler::run` polling
//! shape.

use std::time::Duration;

use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::QueueKind;
use crate::queue;
use crate::storage;

const POLL_IDLE: Duration = Duration::from_secs(10);
const BATCH_SIZE: i64 = 100;

/// The only cohort this worker currently knows how to run; more can be
/// added by name as operators need them without touching the claim loop.
pub const STALE_ON_DOCK: &str = "stale_on_dock";

#[derive(Debug, thiserror::Error)]
pub enum RepairWorkerError {
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
    #[error("unknown repair job kind: {0}")]
    UnknownKind(String),
}

pub struct RepairWorker {
    pool: PgPool,
}

impl RepairWorker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run(&self) {
        info!("starting lifecycle repair worker");
        loop {
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => tokio::time::sleep(POLL_IDLE).await,
                Err(err) => {
                    error!(error = %err, "repair worker iteration failed");
                    tokio::time::sleep(POLL_IDLE).await;
                }
            }
        }
    }

    /// Claim and fully drain one job. Returns `true` if a job was claimed
    /// (so the caller can immediately look for another) or `false` if the
    /// queue was empty.
    pub async fn run_once(&self) -> Result<bool, RepairWorkerError> {
        let Some(job) = storage::repair_jobs::claim_next(&self.pool).await? else {
            return Ok(false);
        };

        info!(job_id = %job.id, kind = %job.kind, "claimed repair job");

        let result = self.drain(job.id, &job.kind).await;
        match result {
            Ok(processed) => {
                storage::repair_jobs::mark_completed(&self.pool, job.id).await?;
                info!(job_id = %job.id, processed, "repair job completed");
            }
            Err(RepairWorkerError::UnknownKind(ref kind)) => {
                warn!(job_id = %job.id, kind, "repair job has unknown cohort kind");
                storage::repair_jobs::mark_failed(&self.pool, job.id, "unknown cohort kind").await?;
            }
            Err(ref err) => {
                error!(job_id = %job.id, error = %err, "repair job failed");
                storage::repair_jobs::mark_failed(&self.pool, job.id, &err.to_string()).await?;
            }
        }

        Ok(true)
    }

    async fn drain(&self, job_id: Uuid, kind: &str) -> Result<i64, RepairWorkerError> {
        if kind != STALE_ON_DOCK {
            return Err(RepairWorkerError::UnknownKind(kind.to_string()));
        }

        let mut offset = 0i64;
        let mut total = 0i64;

        loop {
            if storage::repair_jobs::is_cancel_requested(&self.pool, job_id).await? {
                storage::repair_jobs::mark_cancelled(&self.pool, job_id).await?;
                info!(job_id = %job_id, processed = total, "repair job cancelled");
                return Ok(total);
            }

            let cohort = storage::shipments::stale_on_dock_cohort(&self.pool, BATCH_SIZE, offset).await?;
            if cohort.is_empty() {
                break;
            }

            for shipment_id in &cohort {
                queue::enqueue(
                    &self.pool,
                    QueueKind::LifecycleEvent,
                    &shipment_id.to_string(),
                    serde_json::json!({ "shipmentId": shipment_id }),
                    5,
                )
                .await?;
            }

            let batch_len = cohort.len() as i64;
            storage::repair_jobs::add_processed(&self.pool, job_id, batch_len).await?;
            total += batch_len;
            offset += batch_len;

            if batch_len < BATCH_SIZE {
                break;
            }
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_matches_spec() {
        assert_eq!(BATCH_SIZE, 100);
    }
}
