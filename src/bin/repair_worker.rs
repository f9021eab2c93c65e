//! fulfillment-repair-worker: standalone lifecycle repair job runner
//! (spec.md §4.9).
//!
//! ## Configuration
//! Set via environment variables or a config file named by
//! `FULFILLMENT_CONFIG`. See `fulfillment_core::config::Config`.

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fulfillment_core::config::{Config, LOG_ENV_VAR};
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
    let ctx = AppContext::build(config).await?;

    info!("fulfillment-repair-worker starting");
    ctx.repair_worker().run().await;

    Ok(())
}
