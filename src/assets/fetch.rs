//! Network access for toolkit artifacts

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Client;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Source of raw asset bytes. The cache calls this only on a miss.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches `http(s)://` URLs with reqwest and `file://` URLs from disk
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Load(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix("file://") {
            debug!("Reading local asset: {}", path);
            return tokio::fs::read(path)
                .await
                .map_err(|e| EngineError::AssetFetch {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
        }

        info!("Downloading asset from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                error!("Download failed: {}", e);
                EngineError::AssetFetch {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            })?;

        if !response.status().is_success() {
            return Err(EngineError::AssetFetch {
                url: url.to_string(),
                reason: format!("Download failed with status: {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| EngineError::AssetFetch {
            url: url.to_string(),
            reason: format!("Failed to read response body: {}", e),
        })?;

        info!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
