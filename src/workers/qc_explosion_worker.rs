//! QC explosion worker (spec.md §4.2): consumes `QueueKind::QcExplosion`
//! jobs and runs kit explosion/fingerprinting for each claimed shipment.
//! Shaped like `RateCheckEngine::run_once` — claim a batch, dispatch one
//! pure hydration call per record, record the outcome.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::KitCatalogCache;
use crate::domain::QueueKind;
use crate::fingerprint;
use crate::queue;
use crate::storage;

#[derive(Debug, thiserror::Error)]
pub enum QcExplosionWorkerError {
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
}

pub struct QcExplosionWorker {
    pool: PgPool,
    catalog: Arc<KitCatalogCache>,
    excluded_skus: Vec<String>,
    batch_size: i64,
}

impl QcExplosionWorker {
    pub fn new(pool: PgPool, catalog: Arc<KitCatalogCache>, excluded_skus: Vec<String>, batch_size: i64) -> Self {
        Self {
            pool,
            catalog,
            excluded_skus,
            batch_size,
        }
    }

    pub async fn run(&self) {
        info!(batch_size = self.batch_size, "starting qc explosion worker");
        loop {
            match self.run_once().await {
                Ok(0) => tokio::time::sleep(std::time::Duration::from_secs(10)).await,
                Ok(_) => tokio::time::sleep(std::time::Duration::from_secs(1)).await,
                Err(err) => {
                    warn!(error = %err, "qc explosion worker iteration failed");
                    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                }
            }
        }
    }

    pub async fn run_once(&self) -> Result<usize, QcExplosionWorkerError> {
        let records = queue::claim_batch(&self.pool, QueueKind::QcExplosion, self.batch_size).await?;
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

            match fingerprint::hydrate(&self.pool, &self.catalog, &self.excluded_skus, shipment_id).await {
                Ok(result) if result.error.is_none() => {
                    queue::enqueue(
                        &self.pool,
                        QueueKind::LifecycleEvent,
                        &shipment_id.to_string(),
                        serde_json::json!({ "shipmentId": shipment_id }),
                        5,
                    )
                    .await?;
                    queue::record_outcome(&self.pool, record, queue::Outcome::Completed).await?;
                }
                Ok(result) => {
                    // deferred: catalog not yet caught up for one of this
                    // shipment's skus. Retried like any other failure.
                    warn!(%shipment_id, reason = ?result.error, "qc explosion deferred");
                    queue::record_outcome(
                        &self.pool,
                        record,
                        queue::Outcome::Failed {
                            message: result.error.unwrap_or_default(),
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
