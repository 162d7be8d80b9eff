//! Tile bundle artifact store
//!
//! Artifacts are addressed by `{type}/{zoom}/{x}/{y}.{ext}` under a base URL.
//! `HEAD` probes existence, `PUT` uploads.

use crate::error::{EnrichmentError, EnrichmentResult};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn exists(&self, key: &str) -> EnrichmentResult<bool>;

    async fn upload(&self, key: &str, file: &Path) -> EnrichmentResult<()>;
}

/// Object store reachable over plain HTTP
pub struct HttpArtifactStore {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpArtifactStore {
    pub fn new(base_url: &str, timeout: Duration) -> EnrichmentResult<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn artifact_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn exists(&self, key: &str) -> EnrichmentResult<bool> {
        let response = self.http_client.head(self.artifact_url(key)).send().await?;
        match response.status().as_u16() {
            200..=299 => Ok(true),
            404 => Ok(false),
            status => Err(EnrichmentError::TransientIo(format!(
                "artifact store returned {} probing {}",
                status, key
            ))),
        }
    }

    async fn upload(&self, key: &str, file: &Path) -> EnrichmentResult<()> {
        let bytes = tokio::fs::read(file).await.map_err(|e| {
            EnrichmentError::domain(format!("cannot read bundle {}: {}", file.display(), e))
        })?;
        let size = bytes.len();

        let response = self
            .http_client
            .put(self.artifact_url(key))
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::TransientIo(format!(
                "artifact upload of {} failed with {}: {}",
                key,
                status.as_u16(),
                body
            )));
        }

        tracing::info!(key, size, "Artifact uploaded");
        Ok(())
    }
}

/// Artifact key for a bundle rooted at a tile
pub fn artifact_key(bundle_type: &str, zoom: u8, x: u32, y: u32, extension: &str) -> String {
    format!("{}/{}/{}/{}.{}", bundle_type, zoom, x, y, extension)
}
