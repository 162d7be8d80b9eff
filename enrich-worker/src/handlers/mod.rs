//! Job handlers
//!
//! One [`JobHandler`] implementation per job kind. The engine looks handlers up
//! in a [`HandlerRegistry`] built once at startup; adding a kind means adding a
//! registration in [`build_registry`], nothing in the engine changes.
//!
//! Every handler follows the same shape: validate parameters, fetch the
//! feature, compute, patch the derived fields back.

mod elevation;
mod order_points;
mod regions;
mod tile_bundle;
mod track_metrics;

pub use elevation::{ComputeTrackElevation, ElevationStats, SamplePointElevation};
pub use order_points::OrderRelatedPoints;
pub use regions::{AssociateRegions, UpdateRegion};
pub use tile_bundle::GenerateMapTileBundle;
pub use track_metrics::ComputeTrackMetrics;

use crate::db::SpatialGateway;
use crate::error::EnrichmentResult;
use crate::models::FeatureKind;
use crate::services::{ArtifactStore, FeatureRegistry, TilePackager};
use async_trait::async_trait;
use enrich_common::config::{ElevationConfig, TileBundleConfig};
use enrich_common::JobParameters;
use std::collections::HashMap;
use std::sync::Arc;

pub const ORDER_RELATED_POIS: &str = "order_related_pois";
pub const UPDATE_TRACK_REGIONS: &str = "update_track_regions";
pub const UPDATE_POI_REGIONS: &str = "update_poi_regions";
pub const UPDATE_MEDIA_REGIONS: &str = "update_media_regions";
pub const COMPUTE_TRACK_METRICS: &str = "compute_track_metrics";
pub const UPDATE_REGION: &str = "update_region";
pub const UPDATE_POI_ELEVATION: &str = "update_poi_elevation";
pub const COMPUTE_TRACK_ELEVATION: &str = "compute_track_elevation";
pub const GENERATE_TILE_BUNDLE: &str = "generate_tile_bundle";

/// Enrichment logic for one job kind
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run the job. `Ok(Some(log))` carries an optional execution log for the
    /// success acknowledgement.
    async fn execute(&self, parameters: &JobParameters) -> EnrichmentResult<Option<String>>;
}

/// Job kind → handler dispatch table
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; a later registration for the same kind replaces the earlier one
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), handler).is_some() {
            tracing::warn!(kind = %kind, "Handler registration replaced");
        }
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Collaborators injected into handlers
#[derive(Clone)]
pub struct HandlerServices {
    pub registry: Arc<dyn FeatureRegistry>,
    pub spatial: Arc<dyn SpatialGateway>,
    /// Present only when tile bundles are enabled
    pub tiles: Option<TileServices>,
}

/// Collaborators for tile bundle generation
#[derive(Clone)]
pub struct TileServices {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub packager: Arc<dyn TilePackager>,
    pub config: TileBundleConfig,
}

/// Build the dispatch table for every supported job kind
pub fn build_registry(services: &HandlerServices, elevation: &ElevationConfig) -> HandlerRegistry {
    let registry = &services.registry;
    let spatial = &services.spatial;
    let mut handlers = HandlerRegistry::new();

    handlers.register(
        ORDER_RELATED_POIS,
        Arc::new(OrderRelatedPoints::new(registry.clone(), spatial.clone())),
    );
    for (kind, feature_kind) in [
        (UPDATE_TRACK_REGIONS, FeatureKind::Track),
        (UPDATE_POI_REGIONS, FeatureKind::Poi),
        (UPDATE_MEDIA_REGIONS, FeatureKind::Media),
    ] {
        handlers.register(
            kind,
            Arc::new(AssociateRegions::new(feature_kind, registry.clone(), spatial.clone())),
        );
    }
    handlers.register(
        COMPUTE_TRACK_METRICS,
        Arc::new(ComputeTrackMetrics::new(registry.clone(), spatial.clone())),
    );
    handlers.register(
        UPDATE_REGION,
        Arc::new(UpdateRegion::new(registry.clone(), spatial.clone())),
    );
    handlers.register(
        UPDATE_POI_ELEVATION,
        Arc::new(SamplePointElevation::new(registry.clone(), spatial.clone())),
    );
    handlers.register(
        COMPUTE_TRACK_ELEVATION,
        Arc::new(ComputeTrackElevation::new(
            registry.clone(),
            spatial.clone(),
            elevation.min_sample_spacing_m,
        )),
    );

    if let Some(tiles) = &services.tiles {
        handlers.register(
            GENERATE_TILE_BUNDLE,
            Arc::new(GenerateMapTileBundle::new(
                tiles.artifacts.clone(),
                tiles.packager.clone(),
                tiles.config.clone(),
            )),
        );
    }

    tracing::info!(kinds = ?handlers.kinds(), "Job handlers registered");
    handlers
}
