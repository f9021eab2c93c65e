//! fulfillment-qc-explosion-worker: standalone kit-explosion/fingerprint
//! queue worker (spec.md §4.2).
//!
//! ## Configuration
//! Set via environment variables or a config file named by
//! `FULFILLMENT_CONFIG`. See `fulfillment_core::config::Config`.

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fulfillment_core::config::{Config, LOG_ENV_VAR};
use fulfillment_core::queue;
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
    let stale_threshold = config.business.stale_processing_threshold_secs;
    let ctx = AppContext::build(config).await?;

    let recovered = queue::recover_stale(&ctx.pool, stale_threshold).await?;
    if recovered > 0 {
        info!(recovered, "recovered stale processing queue rows");
    }

    info!("fulfillment-qc-explosion-worker starting");
    ctx.qc_explosion_worker().run().await;

    Ok(())
}
