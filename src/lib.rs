//! Shipment-processing core: the lifecycle state machine, the fingerprint
//! and kit-explosion engine, the durable job queues, and the background
//! workers that carry a shipment from `READY_TO_SESSION` to `ON_DOCK`.
//!
//! Each binary in `src/bin/` wires a subset of these pieces together; this
//! crate root only declares the modules and the shared `AppContext` they're
//! constructed from.

pub mod catalog;
pub mod clients;
pub mod config;
pub mod domain;
pub mod fingerprint;
pub mod lifecycle;
pub mod queue;
pub mod storage;
pub mod webhook;
pub mod workers;

use std::sync::Arc;

use sqlx::PgPool;

use catalog::KitCatalogCache;
use clients::{HttpDocumentStoreClient, HttpLabelProviderClient, RedisSharedCache, SharedCache};
use config::Config;
use workers::qc_explosion_worker::QcExplosionWorker;
use workers::rate_check::RateCheckEngine;
use workers::repair_worker::RepairWorker;
use workers::session_batcher::SessionBatcher;
use workers::session_sync_worker::SessionSyncWorker;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything a worker binary needs to run, assembled once at startup.
pub struct AppContext {
    pub pool: PgPool,
    pub catalog: Arc<KitCatalogCache>,
    pub shared_cache: Arc<dyn SharedCache>,
    pub config: Config,
}

impl AppContext {
    pub async fn build(config: Config) -> Result<Self, BoxError> {
        let pool = storage::connect(&config.storage).await?;
        let catalog = Arc::new(KitCatalogCache::new(pool.clone()));
        let shared_cache = Arc::new(RedisSharedCache::connect(&config.storage.shared_cache_url).await?);
        Ok(Self {
            pool,
            catalog,
            shared_cache,
            config,
        })
    }

    pub fn rate_check_engine(&self) -> Result<RateCheckEngine, BoxError> {
        let label_provider = Arc::new(HttpLabelProviderClient::new(self.config.label_provider.clone())?);
        Ok(RateCheckEngine::new(
            self.pool.clone(),
            label_provider,
            self.shared_cache.clone(),
            self.config.business.rate_check_disallowed_services.clone(),
        ))
    }

    pub fn session_sync_worker(&self) -> Result<SessionSyncWorker, BoxError> {
        let document_store = Arc::new(HttpDocumentStoreClient::new(self.config.document_store.clone())?);
        Ok(SessionSyncWorker::new(
            self.pool.clone(),
            document_store,
            self.catalog.clone(),
            self.config.business.explosion_excluded_skus.clone(),
            self.config.document_store.poll_interval,
        ))
    }

    pub fn session_batcher(&self) -> SessionBatcher {
        SessionBatcher::new(self.pool.clone(), self.config.business.max_orders_per_session)
    }

    pub fn repair_worker(&self) -> RepairWorker {
        RepairWorker::new(self.pool.clone())
    }

    pub fn qc_explosion_worker(&self) -> QcExplosionWorker {
        QcExplosionWorker::new(
            self.pool.clone(),
            self.catalog.clone(),
            self.config.business.explosion_excluded_skus.clone(),
            self.config.business.qc_explosion_batch_size,
        )
    }
}
