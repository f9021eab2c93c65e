//! Application configuration.
//!
//! Loads from environment variables, with a thin `config`-crate layer so a
//! YAML override file can supply the same keys for local development.
//! Mirrors the teacher's `config` module: grouped sub-structs with `Default`
//! impls, plus one `ConfigError` variant per way startup can fail.

use std::time::Duration;

use serde::Deserialize;

/// Environment variable for an optional YAML config file path.
pub const CONFIG_ENV_VAR: &str = "FULFILLMENT_CONFIG";
/// Environment variable for logging configuration (tracing `EnvFilter` syntax).
pub const LOG_ENV_VAR: &str = "FULFILLMENT_LOG";

const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";
const SHARED_CACHE_URL_ENV_VAR: &str = "SHARED_CACHE_URL";
const LABEL_PROVIDER_API_KEY_ENV_VAR: &str = "LABEL_PROVIDER_API_KEY";
const LABEL_PROVIDER_BASE_URL_ENV_VAR: &str = "LABEL_PROVIDER_BASE_URL";
const DOCUMENT_STORE_BASE_URL_ENV_VAR: &str = "DOCUMENT_STORE_BASE_URL";
const WEBHOOK_BASE_URL_ENV_VAR: &str = "WEBHOOK_BASE_URL_OVERRIDE";
const WEBHOOK_SIGNING_SECRET_ENV_VAR: &str = "WEBHOOK_SIGNING_SECRET";
const OTEL_ENDPOINT_ENV_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const OTEL_API_KEY_ENV_VAR: &str = "OTEL_EXPORTER_OTLP_API_KEY";

/// Errors that can occur while assembling startup configuration.
///
/// spec.md §6: "Missing required values abort startup with a descriptive
/// error." — this is the only error category startup treats as fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: String,
        #[source]
        source: config::ConfigError,
    },
}

/// Connection-level settings for the Postgres row store and the shared
/// (Redis-like) cache used for catalog-refresh coordination.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_url: String,
    pub shared_cache_url: String,
    pub max_pool_connections: u32,
}

/// Label-provider HTTP client settings (spec.md §6).
#[derive(Debug, Clone)]
pub struct LabelProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

/// Document-store polling client settings (spec.md §4.6, §6).
#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    pub base_url: String,
    pub poll_interval: Duration,
    pub reimport_page_size: u32,
}

/// Webhook ingest settings (spec.md §6).
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub base_url_override: Option<String>,
    pub signing_secret: String,
    pub replay_cache_capacity: usize,
}

/// OpenTelemetry exporter settings. Entirely optional: absence disables
/// otel, it is never a startup-abort condition (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub otlp_api_key: Option<String>,
}

/// Business tunables referenced throughout spec.md §4 that operators may
/// want to override without a code change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusinessConfig {
    /// spec.md §4.8: default session capacity.
    pub max_orders_per_session: i32,
    /// spec.md §4.5: lifecycle-event batch cap per worker cycle.
    pub lifecycle_batch_size: usize,
    /// spec.md §4.2: qc-explosion queue batch cap per worker cycle.
    pub qc_explosion_batch_size: i64,
    /// spec.md §4.9: repair worker batch size.
    pub repair_batch_size: i64,
    /// spec.md §4.4: stale-processing recovery threshold.
    pub stale_processing_threshold_secs: i64,
    /// spec.md §4.2: sentinel kit SKUs excluded from explosion (e.g. BUILDBAG).
    pub explosion_excluded_skus: Vec<String>,
    /// spec.md §4.7 step 3: service names disallowed as rate-check candidates.
    pub rate_check_disallowed_services: Vec<String>,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            max_orders_per_session: 28,
            lifecycle_batch_size: 5,
            qc_explosion_batch_size: 10,
            repair_batch_size: 100,
            stale_processing_threshold_secs: 300,
            explosion_excluded_skus: vec!["BUILDBAG".to_string()],
            rate_check_disallowed_services: Vec::new(),
        }
    }
}

/// Aggregated application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub label_provider: LabelProviderConfig,
    pub document_store: DocumentStoreConfig,
    pub webhook: WebhookConfig,
    pub telemetry: TelemetryConfig,
    pub business: BusinessConfig,
}

impl Config {
    /// Load configuration from environment variables, optionally layered
    /// over a YAML file named by `FULFILLMENT_CONFIG`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(config::File::with_name(&path).required(false));
        }
        let layered = builder
            .build()
            .map_err(|source| ConfigError::ParseFile {
                path: std::env::var(CONFIG_ENV_VAR).unwrap_or_default(),
                source,
            })?;

        let business: BusinessConfig = layered
            .clone()
            .try_deserialize::<PartialBusiness>()
            .map(|p| p.business.unwrap_or_default())
            .unwrap_or_default();

        Ok(Self {
            storage: StorageConfig {
                database_url: required_env(DATABASE_URL_ENV_VAR)?,
                shared_cache_url: required_env(SHARED_CACHE_URL_ENV_VAR)?,
                max_pool_connections: 10,
            },
            label_provider: LabelProviderConfig {
                base_url: env_or(LABEL_PROVIDER_BASE_URL_ENV_VAR, "https://api.labelprovider.example"),
                api_key: required_env(LABEL_PROVIDER_API_KEY_ENV_VAR)?,
                request_timeout: Duration::from_secs(10),
            },
            document_store: DocumentStoreConfig {
                base_url: required_env(DOCUMENT_STORE_BASE_URL_ENV_VAR)?,
                poll_interval: Duration::from_secs(60),
                reimport_page_size: 500,
            },
            webhook: WebhookConfig {
                base_url_override: std::env::var(WEBHOOK_BASE_URL_ENV_VAR).ok(),
                signing_secret: required_env(WEBHOOK_SIGNING_SECRET_ENV_VAR)?,
                replay_cache_capacity: 10_000,
            },
            telemetry: TelemetryConfig {
                otlp_endpoint: std::env::var(OTEL_ENDPOINT_ENV_VAR).ok(),
                otlp_api_key: std::env::var(OTEL_API_KEY_ENV_VAR).ok(),
            },
            business,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct PartialBusiness {
    business: Option<BusinessConfig>,
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingRequired(name))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_config_defaults_match_spec() {
        let business = BusinessConfig::default();
        assert_eq!(business.max_orders_per_session, 28);
        assert_eq!(business.lifecycle_batch_size, 5);
        assert_eq!(business.repair_batch_size, 100);
        assert_eq!(business.stale_processing_threshold_secs, 300);
        assert!(business
            .explosion_excluded_skus
            .contains(&"BUILDBAG".to_string()));
    }
}
