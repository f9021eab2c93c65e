//! Durable at-least-once queue engine shared by the three named queues
//! (spec.md §4.4). Grounded in the teacher's `utils::retry::RetryConfig`
//! exponential-backoff shape, simplified to the spec's un-jittered
//! `min(5s * 2^retryCount, 300s)` schedule and its fixed 65s rate-limit
//! delay.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use crate::domain::{QueueKind, QueueRecord};
use crate::storage;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

pub type Result<T> = std::result::Result<T, QueueError>;

const BASE_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(300);
const RATE_LIMIT_DELAY: Duration = Duration::from_secs(65);

/// spec.md §4.4: `min(5s * 2^retryCount, 300s)`.
pub fn backoff_for(retry_count: i32) -> Duration {
    let exp = retry_count.max(0).min(20) as u32;
    let millis = BASE_BACKOFF.as_millis().saturating_mul(1u128 << exp);
    Duration::from_millis(millis.min(MAX_BACKOFF.as_millis()) as u64)
}

/// spec.md §4.4 / §7: "handlers may classify an error as rate-limited (HTTP
/// 429 or error text containing 'rate limit')".
pub fn is_rate_limited(http_status: Option<u16>, message: &str) -> bool {
    http_status == Some(429) || message.to_ascii_lowercase().contains("rate limit")
}

/// Outcome a handler reports back to the engine.
pub enum Outcome {
    Completed,
    Failed { message: String, http_status: Option<u16> },
}

/// Enqueue a job, relying on the dedup unique index for `QcExplosion`
/// (spec.md §4.4 "Deduplication").
pub async fn enqueue(
    pool: &PgPool,
    kind: QueueKind,
    correlation_key: &str,
    payload: serde_json::Value,
    max_retries: i32,
) -> Result<QueueRecord> {
    Ok(storage::queue::enqueue(pool, kind, correlation_key, payload, max_retries).await?)
}

/// spec.md §4.4 step (e): record a handler outcome, applying backoff or
/// dead-lettering as appropriate. Returns `true` if the job reached a
/// terminal state (`completed` or `dead_letter`).
pub async fn record_outcome(pool: &PgPool, record: &QueueRecord, outcome: Outcome) -> Result<bool> {
    match outcome {
        Outcome::Completed => {
            storage::queue::mark_completed(pool, record.id).await?;
            Ok(true)
        }
        Outcome::Failed { message, http_status } => {
            let rate_limited = is_rate_limited(http_status, &message);
            let retry_count = if rate_limited {
                record.retry_count
            } else {
                record.retry_count + 1
            };
            let delay = if rate_limited {
                RATE_LIMIT_DELAY
            } else {
                backoff_for(retry_count)
            };
            let next_retry_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();

            storage::queue::mark_failed(
                pool,
                record.id,
                &message,
                http_status.map(|s| s as i32),
                next_retry_at,
                retry_count,
                record.max_retries,
            )
            .await?;

            Ok(!rate_limited && retry_count > record.max_retries)
        }
    }
}

/// spec.md §4.4 "Recovery on startup": rows stuck `processing` past the
/// stale threshold are assumed orphaned by a crashed worker.
pub async fn recover_stale(pool: &PgPool, threshold_secs: i64) -> Result<u64> {
    let cutoff = Utc::now() - chrono::Duration::seconds(threshold_secs);
    Ok(storage::queue::recover_stale_processing(pool, cutoff).await?)
}

pub async fn claim_batch(pool: &PgPool, kind: QueueKind, limit: i64) -> Result<Vec<QueueRecord>> {
    Ok(storage::queue::claim_batch(pool, kind, limit).await?)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub queued: i64,
    pub processing: i64,
    pub failed: i64,
    pub completed: i64,
    pub dead_letter: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_then_caps() {
        assert_eq!(backoff_for(0), Duration::from_secs(5));
        assert_eq!(backoff_for(1), Duration::from_secs(10));
        assert_eq!(backoff_for(2), Duration::from_secs(20));
        assert_eq!(backoff_for(6), Duration::from_secs(300));
        assert_eq!(backoff_for(20), Duration::from_secs(300));
    }

    #[test]
    fn rate_limit_detected_by_status_or_message() {
        assert!(is_rate_limited(Some(429), "boom"));
        assert!(is_rate_limited(None, "429 Too Many Requests"));
        assert!(is_rate_limited(None, "Rate limit exceeded"));
        assert!(!is_rate_limited(Some(500), "internal error"));
    }

    #[test]
    fn rate_limit_delay_matches_spec_scenario_s4() {
        // spec.md S4: attempt 3 of 5 fails with "429 Too Many Requests";
        // retryCount must remain unchanged at 3 and the next retry is ~+65s.
        let message = "429 Too Many Requests";
        assert!(is_rate_limited(None, message));
        let delay = RATE_LIMIT_DELAY;
        assert_eq!(delay, Duration::from_secs(65));
    }

    #[test]
    fn deadletter_fires_once_retry_count_exceeds_max() {
        let retry_count = 6;
        let max_retries = 5;
        assert!(retry_count > max_retries);
    }
}
