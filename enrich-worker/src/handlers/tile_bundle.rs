//! Map tile bundle generation
//!
//! Validates `{zoom, x, y}` against the configured bounds table, converts the
//! tile to a bounding box, runs the packager over `zoom..=zoom+span`, uploads the
//! bundle and removes the local file. An existing artifact short-circuits the
//! whole job before any packaging.

use super::JobHandler;
use crate::error::{EnrichmentError, EnrichmentResult};
use crate::services::{artifact_key, ArtifactStore, TilePackager};
use async_trait::async_trait;
use enrich_common::config::{TileBundleConfig, ZoomBounds};
use enrich_common::{JobParameters, TileCoordinate};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct GenerateMapTileBundle {
    artifacts: Arc<dyn ArtifactStore>,
    packager: Arc<dyn TilePackager>,
    config: TileBundleConfig,
    work_dir: PathBuf,
}

impl GenerateMapTileBundle {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        packager: Arc<dyn TilePackager>,
        config: TileBundleConfig,
    ) -> Self {
        let work_dir = config.work_dir.clone().unwrap_or_else(std::env::temp_dir);
        Self {
            artifacts,
            packager,
            config,
            work_dir,
        }
    }

    /// Parse and check the tile against the bounds table
    fn validate_tile(&self, parameters: &JobParameters) -> EnrichmentResult<(TileCoordinate, ZoomBounds)> {
        let zoom = parameters.required_i64("zoom")?;
        let x = parameters.required_i64("x")?;
        let y = parameters.required_i64("y")?;

        let zoom = u8::try_from(zoom).map_err(|_| EnrichmentError::InvalidParameter {
            key: "zoom".to_string(),
            reason: format!("{} is out of range", zoom),
        })?;
        let x = u32::try_from(x).map_err(|_| EnrichmentError::InvalidParameter {
            key: "x".to_string(),
            reason: format!("{} is out of range", x),
        })?;
        let y = u32::try_from(y).map_err(|_| EnrichmentError::InvalidParameter {
            key: "y".to_string(),
            reason: format!("{} is out of range", y),
        })?;

        let bounds = *self.config.bounds_for(zoom).ok_or_else(|| {
            EnrichmentError::domain(format!("zoom {} is not supported for tile bundles", zoom))
        })?;
        if !bounds.contains(x, y) {
            return Err(EnrichmentError::domain(format!(
                "tile {}/{}/{} is outside the configured bounds for zoom {} (x {:?}, y {:?})",
                zoom, x, y, zoom, bounds.x_range, bounds.y_range
            )));
        }

        let tile = TileCoordinate::new(zoom, x, y)
            .map_err(|e| EnrichmentError::domain(e.to_string()))?;
        Ok((tile, bounds))
    }

    fn local_path(&self, tile: &TileCoordinate) -> PathBuf {
        self.work_dir.join(format!(
            "{}-{}-{}-{}.{}",
            self.config.bundle_type, tile.zoom, tile.x, tile.y, self.config.extension
        ))
    }
}

/// Best-effort removal of the temporary bundle
async fn remove_local(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove temporary bundle"),
    }
}

#[async_trait]
impl JobHandler for GenerateMapTileBundle {
    async fn execute(&self, parameters: &JobParameters) -> EnrichmentResult<Option<String>> {
        let (tile, bounds) = self.validate_tile(parameters)?;
        let key = artifact_key(
            &self.config.bundle_type,
            tile.zoom,
            tile.x,
            tile.y,
            &self.config.extension,
        );

        if self.artifacts.exists(&key).await? {
            tracing::info!(key = %key, "Artifact already exists, skipping generation");
            return Ok(Some(format!("artifact {} already exists, skipped", key)));
        }

        let bbox = tile.bounding_box();
        let output = self.local_path(&tile);
        remove_local(&output).await;

        tracing::info!(
            tile = %tile,
            bbox = %bbox,
            max_zoom = bounds.max_zoom(),
            "Packaging tile bundle"
        );

        let result = async {
            self.packager
                .package(bbox, tile.zoom, bounds.max_zoom(), &output)
                .await?;
            self.artifacts.upload(&key, &output).await
        }
        .await;
        remove_local(&output).await;
        result?;

        Ok(Some(format!(
            "bundle {} generated for zooms {}-{}",
            key,
            tile.zoom,
            bounds.max_zoom()
        )))
    }
}
