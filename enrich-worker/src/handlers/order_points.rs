//! Order a track's related points along the track
//!
//! Each point is projected onto the track line by the spatial store; points are
//! then sorted by their line-locate fraction. The sort is stable, so points with
//! equal fractions keep the order in which they were measured.

use super::JobHandler;
use crate::db::SpatialGateway;
use crate::error::{EnrichmentError, EnrichmentResult};
use crate::models::{FeatureKind, FeaturePatch};
use crate::services::FeatureRegistry;
use async_trait::async_trait;
use enrich_common::{Geometry, JobParameters};
use std::sync::Arc;

pub struct OrderRelatedPoints {
    registry: Arc<dyn FeatureRegistry>,
    spatial: Arc<dyn SpatialGateway>,
}

impl OrderRelatedPoints {
    pub fn new(registry: Arc<dyn FeatureRegistry>, spatial: Arc<dyn SpatialGateway>) -> Self {
        Self { registry, spatial }
    }
}

/// Sort `(fraction, id)` pairs ascending by fraction, stable
fn order_by_fraction(mut located: Vec<(f64, i64)>) -> Vec<i64> {
    located.sort_by(|a, b| a.0.total_cmp(&b.0));
    located.into_iter().map(|(_, id)| id).collect()
}

#[async_trait]
impl JobHandler for OrderRelatedPoints {
    async fn execute(&self, parameters: &JobParameters) -> EnrichmentResult<Option<String>> {
        let track_id = parameters.required_i64("id")?;

        let track = self.registry.fetch_feature(FeatureKind::Track, track_id).await?;
        let line = Geometry::LineString(track.require_line(FeatureKind::Track)?.to_vec());
        let related = track.related_points()?;

        if related.is_empty() {
            tracing::debug!(track_id, "Track has no related points, nothing to order");
            return Ok(Some(format!("track {} has no related points, skipped", track_id)));
        }

        let mut located = Vec::with_capacity(related.len());
        for point in &related {
            let position = match &point.geometry {
                Geometry::Point(p) => *p,
                other => {
                    return Err(EnrichmentError::domain(format!(
                        "related point {} of track {} has {} geometry, expected Point",
                        point.id,
                        track_id,
                        other.type_name()
                    )))
                }
            };
            let fraction = self.spatial.line_locate_fraction(&line, &position).await?;
            located.push((fraction, point.id));
        }

        let ordered = order_by_fraction(located);
        let count = ordered.len();
        self.registry
            .update_feature(
                FeatureKind::Track,
                track_id,
                FeaturePatch::new().set("related_poi_order", ordered),
            )
            .await?;

        tracing::info!(track_id, count, "Related points ordered");
        Ok(Some(format!("ordered {} related points on track {}", count, track_id)))
    }
}
