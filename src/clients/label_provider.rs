//! Label-provider HTTP client (spec.md §6, §4.7).
//!
//! Auth is a static `api-key` header; endpoints consumed are
//! `/shipments/{id}` and `/shipments/{id}/rates`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::LabelProviderConfig;

#[derive(Debug, thiserror::Error)]
pub enum LabelProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("label provider returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl LabelProviderError {
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
        }
    }
}

/// One candidate shipping rate (spec.md §4.7 step 1).
#[derive(Debug, Clone, Deserialize)]
pub struct RateCandidate {
    pub service_code: String,
    pub amount: f64,
    pub delivery_days: Option<u32>,
    pub weight_limit_oz: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentRates {
    pub candidates: Vec<RateCandidate>,
}

#[async_trait]
pub trait LabelProviderClient: Send + Sync {
    async fn get_rates(&self, external_shipment_id: &str) -> Result<ShipmentRates, LabelProviderError>;
}

pub struct HttpLabelProviderClient {
    client: Client,
    config: LabelProviderConfig,
}

impl HttpLabelProviderClient {
    pub fn new(config: LabelProviderConfig) -> Result<Self, LabelProviderError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl LabelProviderClient for HttpLabelProviderClient {
    async fn get_rates(&self, external_shipment_id: &str) -> Result<ShipmentRates, LabelProviderError> {
        let url = format!(
            "{}/shipments/{}/rates",
            self.config.base_url, external_shipment_id
        );
        let response = self
            .client
            .get(&url)
            .header("api-key", &self.config.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LabelProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_reports_its_http_status() {
        let err = LabelProviderError::Status {
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(err.http_status(), Some(429));
    }
}
