//! fulfillment-rate-check-worker: standalone rate-check queue worker
//! (spec.md §4.7).
//!
//! ## Configuration
//! Set via environment variables or a config file named by
//! `FULFILLMENT_CONFIG`. See `fulfillment_core::config::Config`.

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fulfillment_core::config::{Config, LOG_ENV_VAR};
use fulfillment_core::queue;
use fulfillment_core::AppContext;

const POLL_BUSY: std::time::Duration = std::time::Duration::from_secs(2);
const POLL_IDLE: std::time::Duration = std::time::Duration::from_secs(10);
const BATCH_SIZE: i64 = 10;

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
    let stale_threshold = config.business.stale_processing_threshold_secs;
    let ctx = AppContext::build(config).await?;
    let engine = ctx.rate_check_engine()?;

    let recovered = queue::recover_stale(&ctx.pool, stale_threshold).await?;
    if recovered > 0 {
        info!(recovered, "recovered stale processing queue rows");
    }

    info!("fulfillment-rate-check-worker starting");
    loop {
        match engine.run_once(BATCH_SIZE).await {
            Ok(0) => tokio::time::sleep(POLL_IDLE).await,
            Ok(_) => tokio::time::sleep(POLL_BUSY).await,
            Err(err) => {
                error!(error = %err, "rate check worker iteration failed");
                tokio::time::sleep(POLL_IDLE).await;
            }
        }
    }
}
