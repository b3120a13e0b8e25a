//! Network seam used by the release checker and the downloader.

use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use eventlake_core::IngestError;

const USER_AGENT: &str = concat!("eventlake-ingest/", env!("CARGO_PKG_VERSION"));

/// Fetch a whole resource into memory.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, IngestError>;
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::Config(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, IngestError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::network(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::network(url, format!("HTTP {status}")));
        }

        let body = resp.bytes().await.map_err(|e| IngestError::network(url, e))?;
        debug!(url = %url, bytes = body.len(), "fetched");
        Ok(body)
    }
}
