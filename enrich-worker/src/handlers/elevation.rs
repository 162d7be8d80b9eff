//! Elevation enrichment from the DEM raster
//!
//! Samples outside raster coverage come back as `None` and are written as JSON
//! `null`, never as a placeholder number.

use super::JobHandler;
use crate::db::SpatialGateway;
use crate::error::EnrichmentResult;
use crate::models::{FeatureKind, FeaturePatch};
use crate::services::FeatureRegistry;
use async_trait::async_trait;
use enrich_common::geometry::thin_by_distance;
use enrich_common::JobParameters;
use serde_json::Value;
use std::sync::Arc;

/// Whole meters as JSON, or null when absent
fn meters_value(value: Option<f64>) -> Value {
    match value {
        Some(v) => Value::from(v.round()),
        None => Value::Null,
    }
}

// ============================================================================
// Point elevation
// ============================================================================

pub struct SamplePointElevation {
    registry: Arc<dyn FeatureRegistry>,
    spatial: Arc<dyn SpatialGateway>,
}

impl SamplePointElevation {
    pub fn new(registry: Arc<dyn FeatureRegistry>, spatial: Arc<dyn SpatialGateway>) -> Self {
        Self { registry, spatial }
    }
}

#[async_trait]
impl JobHandler for SamplePointElevation {
    async fn execute(&self, parameters: &JobParameters) -> EnrichmentResult<Option<String>> {
        let poi_id = parameters.required_i64("id")?;

        let poi = self.registry.fetch_feature(FeatureKind::Poi, poi_id).await?;
        let position = poi.require_point(FeatureKind::Poi)?;

        let ele = self.spatial.sample_raster(position.lon, position.lat).await?;
        self.registry
            .update_feature(
                FeatureKind::Poi,
                poi_id,
                FeaturePatch::new().set("ele", meters_value(ele)),
            )
            .await?;

        match ele {
            Some(v) => {
                tracing::info!(poi_id, ele = v, "Point elevation sampled");
                Ok(Some(format!("poi {} elevation {} m", poi_id, v.round())))
            }
            None => {
                tracing::info!(poi_id, "Point outside elevation coverage");
                Ok(Some(format!("poi {} outside elevation coverage", poi_id)))
            }
        }
    }
}

// ============================================================================
// Track elevation profile
// ============================================================================

/// Elevation summary of a sampled track
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ElevationStats {
    pub ele_min: Option<f64>,
    pub ele_max: Option<f64>,
    pub ele_from: Option<f64>,
    pub ele_to: Option<f64>,
    pub ascent: Option<f64>,
    pub descent: Option<f64>,
}

impl ElevationStats {
    /// Summarize samples in track order. Absent samples are skipped; ascent and
    /// descent accumulate differences between consecutive present samples.
    pub fn from_samples(samples: &[Option<f64>]) -> Self {
        let present: Vec<f64> = samples.iter().flatten().copied().collect();
        let (Some(&first), Some(&last)) = (present.first(), present.last()) else {
            return Self::default();
        };

        let mut ascent = 0.0;
        let mut descent = 0.0;
        for pair in present.windows(2) {
            let delta = pair[1] - pair[0];
            if delta > 0.0 {
                ascent += delta;
            } else {
                descent -= delta;
            }
        }

        Self {
            ele_min: present.iter().copied().reduce(f64::min),
            ele_max: present.iter().copied().reduce(f64::max),
            ele_from: Some(first),
            ele_to: Some(last),
            ascent: Some(ascent),
            descent: Some(descent),
        }
    }

    pub fn to_patch(&self) -> FeaturePatch {
        FeaturePatch::new()
            .set("ele_min", meters_value(self.ele_min))
            .set("ele_max", meters_value(self.ele_max))
            .set("ele_from", meters_value(self.ele_from))
            .set("ele_to", meters_value(self.ele_to))
            .set("ascent", meters_value(self.ascent))
            .set("descent", meters_value(self.descent))
    }
}

pub struct ComputeTrackElevation {
    registry: Arc<dyn FeatureRegistry>,
    spatial: Arc<dyn SpatialGateway>,
    min_spacing_m: f64,
}

impl ComputeTrackElevation {
    pub fn new(
        registry: Arc<dyn FeatureRegistry>,
        spatial: Arc<dyn SpatialGateway>,
        min_spacing_m: f64,
    ) -> Self {
        Self {
            registry,
            spatial,
            min_spacing_m,
        }
    }
}

#[async_trait]
impl JobHandler for ComputeTrackElevation {
    async fn execute(&self, parameters: &JobParameters) -> EnrichmentResult<Option<String>> {
        let track_id = parameters.required_i64("id")?;

        let track = self.registry.fetch_feature(FeatureKind::Track, track_id).await?;
        let line = track.require_line(FeatureKind::Track)?;

        let picked = thin_by_distance(line, self.min_spacing_m);
        let mut samples = Vec::with_capacity(picked.len());
        for &i in &picked {
            samples.push(self.spatial.sample_raster(line[i].lon, line[i].lat).await?);
        }
        let covered = samples.iter().filter(|s| s.is_some()).count();

        let stats = ElevationStats::from_samples(&samples);
        self.registry
            .update_feature(FeatureKind::Track, track_id, stats.to_patch())
            .await?;

        tracing::info!(
            track_id,
            sampled = picked.len(),
            covered,
            ascent = ?stats.ascent,
            descent = ?stats.descent,
            "Track elevation computed"
        );
        Ok(Some(format!(
            "track {}: {} of {} samples inside elevation coverage",
            track_id,
            covered,
            picked.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stats_skip_absent_samples() {
        let stats =
            ElevationStats::from_samples(&[Some(100.0), None, Some(150.0), Some(120.0), None]);
        assert_eq!(stats.ele_min, Some(100.0));
        assert_eq!(stats.ele_max, Some(150.0));
        assert_eq!(stats.ele_from, Some(100.0));
        assert_eq!(stats.ele_to, Some(120.0));
        assert_eq!(stats.ascent, Some(50.0));
        assert_eq!(stats.descent, Some(30.0));
    }

    #[test]
    fn test_stats_without_coverage() {
        let stats = ElevationStats::from_samples(&[None, None]);
        assert_eq!(stats, ElevationStats::default());

        let patch = stats.to_patch();
        assert_eq!(patch.get("ascent"), Some(&Value::Null));
        assert_eq!(patch.get("ele_min"), Some(&Value::Null));
    }

    #[test]
    fn test_single_sample() {
        let stats = ElevationStats::from_samples(&[Some(-12.4)]);
        assert_eq!(stats.ele_from, Some(-12.4));
        assert_eq!(stats.ascent, Some(0.0));
        assert_eq!(stats.descent, Some(0.0));
        assert_eq!(stats.to_patch().get("ele_to"), Some(&json!(-12.0)));
    }
}
