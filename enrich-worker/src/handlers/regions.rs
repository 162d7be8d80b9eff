//! Region ("where") handlers
//!
//! `AssociateRegions` tags a feature with the ids of every stored region its
//! geometry intersects. `UpdateRegion` copies a region polygon from the
//! registry into the spatial store; it is the only writer of regions. The
//! store rejects non-areal region geometry.

use super::JobHandler;
use crate::db::SpatialGateway;
use crate::error::EnrichmentResult;
use crate::models::{FeatureKind, FeaturePatch};
use crate::services::FeatureRegistry;
use async_trait::async_trait;
use enrich_common::JobParameters;
use std::sync::Arc;

pub struct AssociateRegions {
    kind: FeatureKind,
    registry: Arc<dyn FeatureRegistry>,
    spatial: Arc<dyn SpatialGateway>,
}

impl AssociateRegions {
    pub fn new(
        kind: FeatureKind,
        registry: Arc<dyn FeatureRegistry>,
        spatial: Arc<dyn SpatialGateway>,
    ) -> Self {
        Self {
            kind,
            registry,
            spatial,
        }
    }
}

#[async_trait]
impl JobHandler for AssociateRegions {
    async fn execute(&self, parameters: &JobParameters) -> EnrichmentResult<Option<String>> {
        let id = parameters.required_i64("id")?;

        let feature = self.registry.fetch_feature(self.kind, id).await?;
        let geometry = feature.require_geometry(self.kind)?;

        let mut region_ids = self.spatial.intersecting_regions(geometry).await?;
        region_ids.sort_unstable();
        region_ids.dedup();
        let count = region_ids.len();

        self.registry
            .update_feature(self.kind, id, FeaturePatch::new().set("region_ids", region_ids))
            .await?;

        tracing::info!(kind = %self.kind, id, count, "Regions associated");
        Ok(Some(format!("{} {} associated with {} regions", self.kind, id, count)))
    }
}

pub struct UpdateRegion {
    registry: Arc<dyn FeatureRegistry>,
    spatial: Arc<dyn SpatialGateway>,
}

impl UpdateRegion {
    pub fn new(registry: Arc<dyn FeatureRegistry>, spatial: Arc<dyn SpatialGateway>) -> Self {
        Self { registry, spatial }
    }
}

#[async_trait]
impl JobHandler for UpdateRegion {
    async fn execute(&self, parameters: &JobParameters) -> EnrichmentResult<Option<String>> {
        let id = parameters.required_i64("id")?;

        let region = self.registry.fetch_feature(FeatureKind::Region, id).await?;
        let geometry = region.require_geometry(FeatureKind::Region)?;

        let name = region.property_str("name");
        self.spatial.upsert_region(id, name, geometry).await?;

        tracing::info!(region_id = id, name = name.unwrap_or(""), "Region stored");
        Ok(Some(format!("region {} stored", id)))
    }
}
