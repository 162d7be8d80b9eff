//! Track distance and region tags

use super::JobHandler;
use crate::db::SpatialGateway;
use crate::error::EnrichmentResult;
use crate::models::{FeatureKind, FeaturePatch};
use crate::services::FeatureRegistry;
use async_trait::async_trait;
use enrich_common::{Geometry, JobParameters};
use std::sync::Arc;

pub struct ComputeTrackMetrics {
    registry: Arc<dyn FeatureRegistry>,
    spatial: Arc<dyn SpatialGateway>,
}

impl ComputeTrackMetrics {
    pub fn new(registry: Arc<dyn FeatureRegistry>, spatial: Arc<dyn SpatialGateway>) -> Self {
        Self { registry, spatial }
    }
}

/// Meters to kilometers, kept to meter precision
pub(crate) fn meters_to_km(meters: f64) -> f64 {
    meters.round() / 1000.0
}

#[async_trait]
impl JobHandler for ComputeTrackMetrics {
    async fn execute(&self, parameters: &JobParameters) -> EnrichmentResult<Option<String>> {
        let track_id = parameters.required_i64("id")?;

        let track = self.registry.fetch_feature(FeatureKind::Track, track_id).await?;
        let line = Geometry::LineString(track.require_line(FeatureKind::Track)?.to_vec());

        // Ellipsoidal length from the store, not a haversine sum
        let length_m = self.spatial.length_meters(&line).await?;
        let distance_km = meters_to_km(length_m);

        let mut region_ids = self.spatial.intersecting_regions(&line).await?;
        region_ids.sort_unstable();
        region_ids.dedup();

        self.registry
            .update_feature(
                FeatureKind::Track,
                track_id,
                FeaturePatch::new()
                    .set("distance_km", distance_km)
                    .set("region_ids", region_ids.clone()),
            )
            .await?;

        tracing::info!(track_id, distance_km, regions = region_ids.len(), "Track metrics computed");
        Ok(Some(format!(
            "track {}: {} km, {} regions",
            track_id,
            distance_km,
            region_ids.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meters_to_km_rounding() {
        assert_eq!(meters_to_km(12_345.4), 12.345);
        assert_eq!(meters_to_km(12_345.6), 12.346);
        assert_eq!(meters_to_km(0.0), 0.0);
    }
}
