//! Shared persistence (spec.md §3 "Shared persistence", §4.10 in
//! SPEC_FULL). Strongly-typed row access over a single Postgres pool.
//!
//! Grounded in the teacher's `storage::sql` module: statements are built
//! with `sea_query` and executed with `sqlx::query`, rows are pulled apart
//! with `sqlx::Row::get` rather than compile-time-checked `query!` macros
//! (this repo has no live database to generate macro metadata against, and
//! the teacher's own SQL backends use the same runtime-row-extraction style
//! for exactly that portability reason).

pub mod collections;
pub mod fingerprints;
pub mod qc_items;
pub mod queue;
pub mod rate_analyses;
pub mod repair_jobs;
pub mod schema;
pub mod sessions;
pub mod shipments;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::StorageConfig;

/// Errors surfaced by the persistence layer (spec.md §3 invariants,
/// §5 "unique constraints as the conflict detector").
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unique constraint violated: {0}")]
    Conflict(&'static str),

    #[error("row not found: {0}")]
    NotFound(&'static str),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Build the connection pool used by every worker binary.
pub async fn connect(config: &StorageConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_pool_connections)
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

/// Classify a `sqlx::Error` raised by an insert/update as a unique
/// constraint conflict, naming the violated constraint when Postgres
/// reports one.
pub fn classify_conflict(err: sqlx::Error, fallback_name: &'static str) -> StorageError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return StorageError::Conflict(fallback_name);
        }
    }
    StorageError::Database(err)
}
