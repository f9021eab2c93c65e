//! External collaborators (spec.md §6): label provider, document store, and
//! the shared cache used for opaque service coordination. Each is a trait
//! plus a `reqwest`-backed implementation, grounded in the teacher's
//! `handlers::projectors::cloudevents::http_sink::HttpSink` shape — a thin
//! `reqwest::Client` wrapper behind an `#[async_trait]` port, with an
//! in-memory fake for tests.

pub mod document_store;
pub mod label_provider;
pub mod shared_cache;

pub use document_store::{DocumentStoreClient, DocumentStoreError, HttpDocumentStoreClient, SessionDocument};
pub use label_provider::{HttpLabelProviderClient, LabelProviderClient, LabelProviderError, RateCandidate, ShipmentRates};
pub use shared_cache::{InMemorySharedCache, RedisSharedCache, SharedCache, SharedCacheError};
