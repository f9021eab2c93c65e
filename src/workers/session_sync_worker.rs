//! External session sync worker (spec.md §4.6): polls the document store,
//! writes normalized session fields onto the local shipment row, and
//! detects closed-session transitions the 60 s poll would otherwise miss.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::catalog::KitCatalogCache;
use crate::clients::{DocumentStoreClient, DocumentStoreError, SessionDocument};
use crate::domain::{QueueKind, SessionStatus};
use crate::fingerprint;
use crate::queue;
use crate::storage;

const REIMPORT_PAGE_SIZE: u32 = 500;

#[derive(Debug, thiserror::Error)]
pub enum SessionSyncError {
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
    #[error("document store error: {0}")]
    DocumentStore(#[from] DocumentStoreError),
}

pub struct SessionSyncWorker {
    pool: PgPool,
    document_store: Arc<dyn DocumentStoreClient>,
    catalog: Arc<KitCatalogCache>,
    excluded_skus: Vec<String>,
    poll_interval: Duration,
    errors_count: AtomicU64,
}

impl SessionSyncWorker {
    pub fn new(
        pool: PgPool,
        document_store: Arc<dyn DocumentStoreClient>,
        catalog: Arc<KitCatalogCache>,
        excluded_skus: Vec<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            document_store,
            catalog,
            excluded_skus,
            poll_interval,
            errors_count: AtomicU64::new(0),
        }
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }

    pub async fn run(&self) {
        info!(poll_interval = ?self.poll_interval, "starting session sync worker");
        loop {
            // spec.md §4.6 "any exception aborts the cycle, increments
            // errorsCount, and leaves workerStatus='error'; the next
            // interval retries from scratch."
            if let Err(err) = self.run_once().await {
                self.errors_count.fetch_add(1, Ordering::Relaxed);
                error!(error = %err, "session sync cycle failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn run_once(&self) -> Result<(), SessionSyncError> {
        let open_sessions = self.document_store.fetch_open_sessions().await?;
        let observed_session_ids: HashSet<String> =
            open_sessions.iter().map(|s| s.session_id.clone()).collect();

        for document in &open_sessions {
            self.sync_document(document).await?;
        }

        self.detect_closed_transitions(&observed_session_ids).await?;
        Ok(())
    }

    /// spec.md §4.6 steps 2-5, shared by the live poll and reimport mode.
    async fn sync_document(&self, document: &SessionDocument) -> Result<(), SessionSyncError> {
        let Some(shipment) = storage::shipments::find_by_order_and_external_id(
            &self.pool,
            &document.order_number,
            &document.external_shipment_id,
        )
        .await?
        else {
            return Ok(());
        };

        let Some(new_status) = SessionStatus::parse(&document.session_status) else {
            warn!(status = %document.session_status, "unrecognized upstream session status");
            return Ok(());
        };

        let unchanged = shipment.session_status.as_ref() == Some(&new_status)
            && shipment.external_document_id.as_deref() == Some(document.document_id.as_str())
            && shipment.pick_started_at == document.pick_start_datetime
            && shipment.pick_ended_at == document.pick_end_datetime;

        if unchanged {
            return Ok(());
        }

        let update = storage::shipments::SessionSyncUpdate {
            session_status: new_status,
            external_session_id: document.session_id.clone(),
            spot_number: document.spot_number,
            external_document_id: Some(document.document_id.clone()),
            picked_by_user_id: document.picked_by_user_id.clone(),
            picked_by_user_name: document.picked_by_user_name.clone(),
            saved_custom_field_2: document.saved_custom_field_2.clone(),
            pick_started_at: document.pick_start_datetime,
            pick_ended_at: document.pick_end_datetime,
        };
        storage::shipments::apply_session_sync(&self.pool, shipment.id, &update).await?;

        queue::enqueue(
            &self.pool,
            QueueKind::LifecycleEvent,
            &shipment.id.to_string(),
            serde_json::json!({ "shipmentId": shipment.id }),
            5,
        )
        .await?;

        // spec.md §4.6 step 5: proactive hydration.
        let qc_items = storage::qc_items::list_for_shipment(&self.pool, shipment.id).await?;
        if qc_items.is_empty() {
            if let Err(err) = self.catalog.ensure_fresh().await {
                warn!(shipment_id = %shipment.id, error = %err, "proactive hydration: catalog refresh failed");
            } else if let Err(err) =
                fingerprint::hydrate(&self.pool, &self.catalog, &self.excluded_skus, shipment.id).await
            {
                warn!(shipment_id = %shipment.id, error = %err, "proactive hydration failed");
            }
        }

        Ok(())
    }

    /// spec.md §4.6 step 6: shipments whose stored session status hasn't
    /// reached `closed` but whose session no longer appears in the
    /// open-sessions feed are re-checked individually.
    async fn detect_closed_transitions(&self, observed_open: &HashSet<String>) -> Result<(), SessionSyncError> {
        let tracked = storage::shipments::ids_with_open_session_status(&self.pool).await?;

        for (shipment_id, external_session_id, _status) in tracked {
            if observed_open.contains(&external_session_id) {
                continue;
            }

            let Some(document) = self.document_store.fetch_session(&external_session_id).await? else {
                continue;
            };

            if document.session_status.eq_ignore_ascii_case("closed") {
                storage::shipments::mark_session_closed(&self.pool, shipment_id).await?;
                queue::enqueue(
                    &self.pool,
                    QueueKind::LifecycleEvent,
                    &shipment_id.to_string(),
                    serde_json::json!({ "shipmentId": shipment_id }),
                    5,
                )
                .await?;
            }
        }

        Ok(())
    }

    /// spec.md §4.6 "Reimport mode": paginated scan of everything updated
    /// since `since`, cursor advancing to `last.updated_date + 1ms`, stopping
    /// once a page returns fewer than the batch size.
    pub async fn reimport(&self, since: DateTime<Utc>) -> Result<usize, SessionSyncError> {
        let mut cursor = since;
        let mut total = 0usize;

        loop {
            let page = self.document_store.fetch_updated_since(cursor, REIMPORT_PAGE_SIZE).await?;
            let page_len = page.len();
            for document in &page {
                self.sync_document(document).await?;
                total += 1;
            }

            let Some(last) = page.last() else { break };
            cursor = last.updated_date + chrono::Duration::milliseconds(1);

            if page_len < REIMPORT_PAGE_SIZE as usize {
                break;
            }
        }

        Ok(total)
    }
}
