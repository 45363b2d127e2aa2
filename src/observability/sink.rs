use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::envelope::Envelope;

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send(&self, batch: &[Envelope]) -> Result<()>;
    fn sink_name(&self) -> &'static str;
}

/// Posts envelope batches to the ingestion endpoint.
pub struct IngestionSink {
    endpoint: Url,
    client: Client,
}

impl IngestionSink {
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl TelemetrySink for IngestionSink {
    async fn send(&self, batch: &[Envelope]) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(batch)
            .send()
            .await
            .map_err(sanitize_reqwest_error)?;

        if response.status().is_success() {
            return Ok(());
        }

        Err(anyhow!(
            "telemetry ingestion returned non-success status: {}",
            response.status()
        ))
    }

    fn sink_name(&self) -> &'static str {
        "ingestion"
    }
}

fn sanitize_reqwest_error(error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("telemetry ingestion request timed out");
    }
    if error.is_connect() {
        return anyhow!("telemetry ingestion connection failed");
    }
    anyhow!("telemetry ingestion request failed")
}
