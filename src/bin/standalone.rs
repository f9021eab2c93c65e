//! fulfillment-standalone: all workers in a single process.
//!
//! Runs the lifecycle, qc-explosion, rate-check, session-sync, and repair
//! workers side by side, plus a timed session-batcher sweep. Intended for
//! local development and small deployments that don't need one container
//! per worker.
//!
//! ## Configuration
//! Set via environment variables or a config file named by
//! `FULFILLMENT_CONFIG`. See `fulfillment_core::config::Config`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fulfillment_core::config::{Config, LOG_ENV_VAR};
use fulfillment_core::queue;
use fulfillment_core::AppContext;

const SESSION_BATCH_INTERVAL: Duration = Duration::from_secs(300);
const RATE_CHECK_POLL_BUSY: Duration = Duration::from_secs(2);
const RATE_CHECK_POLL_IDLE: Duration = Duration::from_secs(10);
const RATE_CHECK_BATCH_SIZE: i64 = 10;

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
    let lifecycle_batch_size = config.business.lifecycle_batch_size;
    let stale_threshold = config.business.stale_processing_threshold_secs;
    let ctx = AppContext::build(config).await?;

    let recovered = queue::recover_stale(&ctx.pool, stale_threshold).await?;
    if recovered > 0 {
        info!(recovered, "recovered stale processing queue rows");
    }

    info!("fulfillment-standalone starting");

    let rate_check = Arc::new(ctx.rate_check_engine()?);
    let lifecycle_worker = fulfillment_core::workers::lifecycle_worker::LifecycleWorker::new(
        ctx.pool.clone(),
        rate_check.clone(),
        lifecycle_batch_size,
    );
    let qc_explosion_worker = ctx.qc_explosion_worker();
    let session_sync_worker = ctx.session_sync_worker()?;
    let repair_worker = ctx.repair_worker();
    let session_batcher = ctx.session_batcher();

    tokio::join!(
        lifecycle_worker.run(),
        qc_explosion_worker.run(),
        rate_check_loop(rate_check),
        session_sync_worker.run(),
        repair_worker.run(),
        session_batch_loop(session_batcher),
    );

    Ok(())
}

async fn rate_check_loop(engine: Arc<fulfillment_core::workers::rate_check::RateCheckEngine>) {
    loop {
        match engine.run_once(RATE_CHECK_BATCH_SIZE).await {
            Ok(0) => tokio::time::sleep(RATE_CHECK_POLL_IDLE).await,
            Ok(_) => tokio::time::sleep(RATE_CHECK_POLL_BUSY).await,
            Err(err) => {
                error!(error = %err, "rate check iteration failed");
                tokio::time::sleep(RATE_CHECK_POLL_IDLE).await;
            }
        }
    }
}

/// spec.md §4.8: `buildSessions` is an on-demand operation, not a durable
/// queue consumer. Standalone mode runs it on a fixed sweep so sessionable
/// shipments don't pile up with no admin action to trigger a batch.
async fn session_batch_loop(batcher: fulfillment_core::workers::session_batcher::SessionBatcher) {
    loop {
        tokio::time::sleep(SESSION_BATCH_INTERVAL).await;
        let options = fulfillment_core::workers::session_batcher::BuildSessionsOptions {
            station_type: None,
            dry_run: false,
        };
        match batcher.build_sessions(options).await {
            Ok(result) => {
                if result.sessions_created > 0 || result.assigned > 0 {
                    info!(
                        assigned = result.assigned,
                        sessions_created = result.sessions_created,
                        "session batch sweep complete"
                    );
                }
            }
            Err(err) => error!(error = %err, "session batch sweep failed"),
        }
    }
}
