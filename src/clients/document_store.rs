//! Document-store polling client (spec.md §4.6, §6).
//!
//! Streams session documents; the core only ever reads, never writes, this
//! store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::config::DocumentStoreConfig;

#[derive(Debug, thiserror::Error)]
pub enum DocumentStoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("document store returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// spec.md §6 "Document store": required fields of a session document.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionDocument {
    pub session_id: String,
    pub session_status: String,
    pub order_number: String,
    pub external_shipment_id: String,
    pub pick_start_datetime: Option<DateTime<Utc>>,
    pub pick_end_datetime: Option<DateTime<Utc>>,
    pub spot_number: Option<i32>,
    pub picked_by_user_id: Option<String>,
    pub picked_by_user_name: Option<String>,
    pub saved_custom_field_2: Option<String>,
    pub document_id: String,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SessionPage {
    sessions: Vec<SessionDocument>,
}

#[async_trait]
pub trait DocumentStoreClient: Send + Sync {
    /// spec.md §4.6 step 1: all sessions with status != closed.
    async fn fetch_open_sessions(&self) -> Result<Vec<SessionDocument>, DocumentStoreError>;

    /// spec.md §4.6 step 6: re-read a single session by id.
    async fn fetch_session(&self, session_id: &str) -> Result<Option<SessionDocument>, DocumentStoreError>;

    /// spec.md §4.6 "Reimport mode": one page of sessions updated at or
    /// after `since`, ordered by `updated_date`. The caller advances the
    /// cursor to `last.updated_date + 1ms` and stops once a page returns
    /// fewer than `page_size` rows.
    async fn fetch_updated_since(
        &self,
        since: DateTime<Utc>,
        page_size: u32,
    ) -> Result<Vec<SessionDocument>, DocumentStoreError>;
}

pub struct HttpDocumentStoreClient {
    client: Client,
    config: DocumentStoreConfig,
}

impl HttpDocumentStoreClient {
    pub fn new(config: DocumentStoreConfig) -> Result<Self, DocumentStoreError> {
        let client = Client::builder().timeout(std::time::Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }

    async fn get_page(&self, query: &[(&str, String)]) -> Result<Vec<SessionDocument>, DocumentStoreError> {
        let response = self
            .client
            .get(format!("{}/sessions", self.config.base_url))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DocumentStoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<SessionPage>().await?.sessions)
    }
}

#[async_trait]
impl DocumentStoreClient for HttpDocumentStoreClient {
    async fn fetch_open_sessions(&self) -> Result<Vec<SessionDocument>, DocumentStoreError> {
        self.get_page(&[("status_ne", "closed".to_string())]).await
    }

    async fn fetch_session(&self, session_id: &str) -> Result<Option<SessionDocument>, DocumentStoreError> {
        let mut page = self.get_page(&[("session_id", session_id.to_string())]).await?;
        Ok(page.pop())
    }

    async fn fetch_updated_since(
        &self,
        since: DateTime<Utc>,
        page_size: u32,
    ) -> Result<Vec<SessionDocument>, DocumentStoreError> {
        self.get_page(&[
            ("updated_since", since.to_rfc3339()),
            ("page_size", page_size.to_string()),
        ])
        .await
    }
}
