//! Feature registry client
//!
//! The registry is the geometry source of truth. Records are fetched with
//! `GET {base}/api/{kind}/{id}` and patched with `PATCH` on the same URL.

use crate::error::{EnrichmentError, EnrichmentResult};
use crate::models::{Feature, FeatureKind, FeaturePatch};
use async_trait::async_trait;
use enrich_common::config::RegistryConfig;
use std::time::Duration;

/// Registry operations used by job handlers
#[async_trait]
pub trait FeatureRegistry: Send + Sync {
    async fn fetch_feature(&self, kind: FeatureKind, id: i64) -> EnrichmentResult<Feature>;

    async fn update_feature(
        &self,
        kind: FeatureKind,
        id: i64,
        patch: FeaturePatch,
    ) -> EnrichmentResult<()>;
}

/// HTTP feature registry client
pub struct RegistryClient {
    http_client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig, timeout: Duration) -> EnrichmentResult<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn feature_url(&self, kind: FeatureKind, id: i64) -> String {
        format!("{}/api/{}/{}", self.base_url, kind.path_segment(), id)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Map a non-success registry status to an error
fn status_error(kind: FeatureKind, id: i64, status: u16, body: String) -> EnrichmentError {
    match status {
        404 => EnrichmentError::FeatureNotFound { kind, id },
        s if s >= 500 => {
            EnrichmentError::TransientIo(format!("registry returned {} for {} {}: {}", s, kind, id, body))
        }
        s => EnrichmentError::domain(format!(
            "registry rejected {} {} with status {}: {}",
            kind, id, s, body
        )),
    }
}

#[async_trait]
impl FeatureRegistry for RegistryClient {
    async fn fetch_feature(&self, kind: FeatureKind, id: i64) -> EnrichmentResult<Feature> {
        let url = self.feature_url(kind, id);
        tracing::debug!(%kind, id, url = %url, "Fetching feature");

        let response = self.authorized(self.http_client.get(&url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(kind, id, status.as_u16(), body));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            EnrichmentError::domain(format!("malformed {} {} from registry: {}", kind, id, e))
        })
    }

    async fn update_feature(
        &self,
        kind: FeatureKind,
        id: i64,
        patch: FeaturePatch,
    ) -> EnrichmentResult<()> {
        let url = self.feature_url(kind, id);
        let fields: Vec<&String> = patch.keys().collect();
        tracing::debug!(%kind, id, ?fields, "Patching feature");

        let response = self
            .authorized(self.http_client.patch(&url))
            .json(&patch)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(kind, id, status.as_u16(), body));
        }
        Ok(())
    }
}
