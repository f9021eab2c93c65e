//! fulfillment-lifecycle-worker: standalone lifecycle event worker
//! (spec.md §4.5).
//!
//! ## Configuration
//! Set via environment variables or a config file named by
//! `FULFILLMENT_CONFIG`. See `fulfillment_core::config::Config`.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fulfillment_core::config::{Config, LOG_ENV_VAR};
use fulfillment_core::queue;
use fulfillment_core::workers::lifecycle_worker::LifecycleWorker;
use fulfillment_core::AppContext;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let batch_size = config.business.lifecycle_batch_size;
    let stale_threshold = config.business.stale_processing_threshold_secs;
    let ctx = AppContext::build(config).await?;
    let rate_check = Arc::new(ctx.rate_check_engine()?);

    let recovered = queue::recover_stale(&ctx.pool, stale_threshold).await?;
    if recovered > 0 {
        info!(recovered, "recovered stale processing queue rows");
    }

    info!("fulfillment-lifecycle-worker starting");
    let worker = LifecycleWorker::new(ctx.pool, rate_check, batch_size);
    worker.run().await;

    Ok(())
}
