//! Test Helper Utilities
//!
//! In-memory fakes of the worker's collaborators. Each fake records its calls
//! so tests can assert on what the engine and handlers did.

#![allow(dead_code)]

use async_trait::async_trait;
use enrich_common::config::{TileBundleConfig, ZoomBounds};
use enrich_common::geometry::haversine_distance_meters;
use enrich_common::{BoundingBox, Geometry, Job, Position};
use enrich_worker::db::{require_region_geometry, SpatialGateway};
use enrich_worker::error::{EnrichmentError, EnrichmentResult};
use enrich_worker::models::{Feature, FeatureKind, FeaturePatch};
use enrich_worker::services::{ArtifactStore, FeatureRegistry, QueueClient, QueueError, TilePackager};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub fn pos(lon: f64, lat: f64) -> Position {
    Position::new(lon, lat).unwrap()
}

pub fn point(lon: f64, lat: f64) -> Geometry {
    Geometry::Point(pos(lon, lat))
}

pub fn line(coords: &[(f64, f64)]) -> Geometry {
    Geometry::LineString(coords.iter().map(|&(lon, lat)| pos(lon, lat)).collect())
}

/// Axis-aligned rectangle polygon
pub fn rectangle(west: f64, south: f64, east: f64, north: f64) -> Geometry {
    Geometry::Polygon(vec![vec![
        pos(west, south),
        pos(east, south),
        pos(east, north),
        pos(west, north),
        pos(west, south),
    ]])
}

/// Job with JSON-text parameters, the queue's wire form
pub fn job(id: i64, kind: &str, parameters: serde_json::Value) -> Job {
    Job {
        id,
        kind: kind.to_string(),
        instance: "test".to_string(),
        parameters: json!(parameters.to_string()),
    }
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    Success { job_id: i64, log: Option<String> },
    Failure { job_id: i64, error_log: String },
}

impl Ack {
    pub fn job_id(&self) -> i64 {
        match self {
            Ack::Success { job_id, .. } | Ack::Failure { job_id, .. } => *job_id,
        }
    }
}

/// Scripted queue: pulls pop from the script, then return "no job"
#[derive(Default)]
pub struct FakeQueue {
    script: Mutex<VecDeque<Result<Option<Job>, QueueError>>>,
    pulls: Mutex<Vec<Vec<String>>>,
    acks: Mutex<Vec<Ack>>,
    fail_acks: bool,
    cancel_on_pull: Mutex<Option<(usize, CancellationToken)>>,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let queue = Self::new();
        for job in jobs {
            queue.push(Ok(Some(job)));
        }
        queue
    }

    /// Every acknowledgement call returns an API error
    pub fn failing_acks(mut self) -> Self {
        self.fail_acks = true;
        self
    }

    pub fn push(&self, result: Result<Option<Job>, QueueError>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// Cancel `token` while serving pull number `n` (1-based)
    pub fn cancel_on_pull(&self, n: usize, token: CancellationToken) {
        *self.cancel_on_pull.lock().unwrap() = Some((n, token));
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.lock().unwrap().len()
    }

    /// Kinds requested on each pull
    pub fn pulled_kinds(&self) -> Vec<Vec<String>> {
        self.pulls.lock().unwrap().clone()
    }

    pub fn acks(&self) -> Vec<Ack> {
        self.acks.lock().unwrap().clone()
    }

    fn record_ack(&self, ack: Ack) -> Result<(), QueueError> {
        self.acks.lock().unwrap().push(ack);
        if self.fail_acks {
            Err(QueueError::Api(500, "queue unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueClient for FakeQueue {
    async fn pull(
        &self,
        job_kinds: &[String],
        _instances: &[String],
    ) -> Result<Option<Job>, QueueError> {
        let n = {
            let mut pulls = self.pulls.lock().unwrap();
            pulls.push(job_kinds.to_vec());
            pulls.len()
        };
        if let Some((at, token)) = self.cancel_on_pull.lock().unwrap().as_ref() {
            if *at == n {
                token.cancel();
            }
        }
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn acknowledge_success(&self, job_id: i64, log: Option<&str>) -> Result<(), QueueError> {
        self.record_ack(Ack::Success {
            job_id,
            log: log.map(str::to_string),
        })
    }

    async fn acknowledge_failure(
        &self,
        job_id: i64,
        error_log: &str,
        _log: Option<&str>,
    ) -> Result<(), QueueError> {
        self.record_ack(Ack::Failure {
            job_id,
            error_log: error_log.to_string(),
        })
    }
}

// ============================================================================
// Feature registry
// ============================================================================

#[derive(Default)]
pub struct FakeRegistry {
    features: Mutex<HashMap<(FeatureKind, i64), Feature>>,
    patches: Mutex<Vec<(FeatureKind, i64, FeaturePatch)>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: FeatureKind, feature: Feature) {
        self.features.lock().unwrap().insert((kind, feature.id), feature);
    }

    pub fn patches(&self) -> Vec<(FeatureKind, i64, FeaturePatch)> {
        self.patches.lock().unwrap().clone()
    }

    /// The only patch written, panicking if there is not exactly one
    pub fn single_patch(&self) -> FeaturePatch {
        let patches = self.patches();
        assert_eq!(patches.len(), 1, "expected exactly one patch, got {:?}", patches);
        patches[0].2.clone()
    }
}

#[async_trait]
impl FeatureRegistry for FakeRegistry {
    async fn fetch_feature(&self, kind: FeatureKind, id: i64) -> EnrichmentResult<Feature> {
        self.features
            .lock()
            .unwrap()
            .get(&(kind, id))
            .cloned()
            .ok_or(EnrichmentError::FeatureNotFound { kind, id })
    }

    async fn update_feature(
        &self,
        kind: FeatureKind,
        id: i64,
        patch: FeaturePatch,
    ) -> EnrichmentResult<()> {
        self.patches.lock().unwrap().push((kind, id, patch));
        Ok(())
    }
}

// ============================================================================
// Spatial store
// ============================================================================

/// Planar stand-in for the spatial store.
///
/// Intersection uses bounding boxes, which is exact for the points and
/// axis-aligned rectangles the tests use. Lengths are haversine sums and
/// line-locate is a planar projection.
#[derive(Default)]
pub struct FakeSpatial {
    regions: Mutex<BTreeMap<i64, (Option<String>, Geometry)>>,
    elevations: Mutex<Vec<((f64, f64), f64)>>,
    raster_samples: Mutex<usize>,
}

fn extent(geometry: &Geometry) -> (f64, f64, f64, f64) {
    let positions = geometry.positions();
    positions.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(w, s, e, n), p| (w.min(p.lon), s.min(p.lat), e.max(p.lon), n.max(p.lat)),
    )
}

fn extents_overlap(a: &Geometry, b: &Geometry) -> bool {
    let (aw, as_, ae, an) = extent(a);
    let (bw, bs, be, bn) = extent(b);
    aw <= be && bw <= ae && as_ <= bn && bs <= an
}

impl FakeSpatial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&self, id: i64, geometry: Geometry) {
        self.regions.lock().unwrap().insert(id, (None, geometry));
    }

    pub fn region(&self, id: i64) -> Option<(Option<String>, Geometry)> {
        self.regions.lock().unwrap().get(&id).cloned()
    }

    /// Raster value at an exact location; everywhere else is outside coverage
    pub fn set_elevation(&self, lon: f64, lat: f64, ele: f64) {
        self.elevations.lock().unwrap().push(((lon, lat), ele));
    }

    pub fn raster_samples(&self) -> usize {
        *self.raster_samples.lock().unwrap()
    }
}

#[async_trait]
impl SpatialGateway for FakeSpatial {
    async fn intersects(&self, a: &Geometry, b: &Geometry) -> EnrichmentResult<bool> {
        Ok(extents_overlap(a, b))
    }

    async fn intersecting_regions(&self, geometry: &Geometry) -> EnrichmentResult<Vec<i64>> {
        Ok(self
            .regions
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, (_, region))| extents_overlap(region, geometry))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn length_meters(&self, geometry: &Geometry) -> EnrichmentResult<f64> {
        let positions = geometry.positions();
        Ok(positions
            .windows(2)
            .map(|w| haversine_distance_meters(&w[0], &w[1]))
            .sum())
    }

    async fn line_locate_fraction(
        &self,
        line: &Geometry,
        point: &Position,
    ) -> EnrichmentResult<f64> {
        let vertices = line.positions();
        let lengths: Vec<f64> = vertices
            .windows(2)
            .map(|w| ((w[1].lon - w[0].lon).powi(2) + (w[1].lat - w[0].lat).powi(2)).sqrt())
            .collect();
        let total: f64 = lengths.iter().sum();
        if total == 0.0 {
            return Ok(0.0);
        }

        let mut best = (f64::INFINITY, 0.0);
        let mut walked = 0.0;
        for (w, len) in vertices.windows(2).zip(&lengths) {
            let (dx, dy) = (w[1].lon - w[0].lon, w[1].lat - w[0].lat);
            let t = if *len == 0.0 {
                0.0
            } else {
                (((point.lon - w[0].lon) * dx + (point.lat - w[0].lat) * dy) / (len * len))
                    .clamp(0.0, 1.0)
            };
            let (px, py) = (w[0].lon + t * dx, w[0].lat + t * dy);
            let distance = ((point.lon - px).powi(2) + (point.lat - py).powi(2)).sqrt();
            if distance < best.0 {
                best = (distance, (walked + t * len) / total);
            }
            walked += len;
        }
        Ok(best.1)
    }

    async fn sample_raster(&self, lon: f64, lat: f64) -> EnrichmentResult<Option<f64>> {
        *self.raster_samples.lock().unwrap() += 1;
        Ok(self
            .elevations
            .lock()
            .unwrap()
            .iter()
            .find(|((x, y), _)| *x == lon && *y == lat)
            .map(|(_, ele)| *ele))
    }

    async fn upsert_region(
        &self,
        id: i64,
        name: Option<&str>,
        geometry: &Geometry,
    ) -> EnrichmentResult<()> {
        require_region_geometry(id, geometry)?;
        self.regions
            .lock()
            .unwrap()
            .insert(id, (name.map(str::to_string), geometry.clone()));
        Ok(())
    }
}

// ============================================================================
// Tile bundles
// ============================================================================

#[derive(Default)]
pub struct FakeArtifacts {
    stored: Mutex<HashSet<String>>,
    uploads: Mutex<Vec<String>>,
}

impl FakeArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str) {
        self.stored.lock().unwrap().insert(key.to_string());
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for FakeArtifacts {
    async fn exists(&self, key: &str) -> EnrichmentResult<bool> {
        Ok(self.stored.lock().unwrap().contains(key))
    }

    async fn upload(&self, key: &str, path: &Path) -> EnrichmentResult<()> {
        if !path.exists() {
            return Err(EnrichmentError::domain(format!(
                "nothing to upload at {}",
                path.display()
            )));
        }
        self.uploads.lock().unwrap().push(key.to_string());
        self.stored.lock().unwrap().insert(key.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageCall {
    pub bbox: BoundingBox,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub output: PathBuf,
}

/// Records invocations and writes a placeholder bundle
#[derive(Default)]
pub struct FakePackager {
    calls: Mutex<Vec<PackageCall>>,
    fail: bool,
}

impl FakePackager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<PackageCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TilePackager for FakePackager {
    async fn package(
        &self,
        bbox: BoundingBox,
        min_zoom: u8,
        max_zoom: u8,
        output: &Path,
    ) -> EnrichmentResult<()> {
        self.calls.lock().unwrap().push(PackageCall {
            bbox,
            min_zoom,
            max_zoom,
            output: output.to_path_buf(),
        });
        if self.fail {
            return Err(EnrichmentError::domain("packager exited with status 1"));
        }
        tokio::fs::write(output, b"bundle").await.map_err(enrich_common::Error::from)?;
        Ok(())
    }
}

/// Bundle config with one supported zoom: 9, x 270..=275, y 180..=190, span 3
pub fn tile_config(work_dir: &Path) -> TileBundleConfig {
    TileBundleConfig {
        enabled: true,
        source: Some("tiles.example/source".to_string()),
        artifact_base_url: Some("http://artifacts.local".to_string()),
        work_dir: Some(work_dir.to_path_buf()),
        zooms: vec![ZoomBounds {
            zoom: 9,
            x_range: [270, 275],
            y_range: [180, 190],
            span: 3,
        }],
        ..TileBundleConfig::default()
    }
}
