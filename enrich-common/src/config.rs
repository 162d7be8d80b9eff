//! Worker configuration
//!
//! Settings come from a TOML file, then environment variables override
//! individual keys, then compiled defaults fill whatever is left. Required keys
//! (service URLs, queue token, database URL) are checked by [`WorkerConfig::validate`].

use crate::geometry::MAX_ZOOM;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "ENRICH_CONFIG";

/// Complete worker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue: QueueConfig,
    pub registry: RegistryConfig,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub tile_bundles: TileBundleConfig,
    pub elevation: ElevationConfig,
    /// Fallback log filter when RUST_LOG is unset
    pub log_level: Option<String>,
}

/// Queue service connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub base_url: String,
    pub token: String,
    /// Instances this worker accepts jobs for (empty = any)
    pub instances: Vec<String>,
    /// Job kinds to pull (unset = every registered kind)
    pub job_kinds: Option<Vec<String>>,
}

/// Feature registry connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub base_url: String,
    pub token: Option<String>,
}

/// Spatial store connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 4,
        }
    }
}

/// Job loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sleep after an empty or failed pull
    pub backoff_seconds: u64,
    /// Connect + request timeout for every HTTP call
    pub http_timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backoff_seconds: 5,
            http_timeout_seconds: 10,
        }
    }
}

/// Map tile bundle generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TileBundleConfig {
    pub enabled: bool,
    /// Packaging tool executable
    pub packager_path: String,
    /// Tile source handed to the packager
    pub source: Option<String>,
    /// First segment of the artifact key
    pub bundle_type: String,
    /// Artifact file extension
    pub extension: String,
    /// Artifact store base URL
    pub artifact_base_url: Option<String>,
    /// Where temporary bundles are written (system temp dir if unset)
    pub work_dir: Option<PathBuf>,
    /// Supported zoom levels and their tile rectangles
    pub zooms: Vec<ZoomBounds>,
}

impl Default for TileBundleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            packager_path: "tl".to_string(),
            source: None,
            bundle_type: "raster".to_string(),
            extension: "mbtiles".to_string(),
            artifact_base_url: None,
            work_dir: None,
            zooms: Vec::new(),
        }
    }
}

/// Tile rectangle accepted at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomBounds {
    pub zoom: u8,
    /// Inclusive `[min, max]` column range
    pub x_range: [u32; 2],
    /// Inclusive `[min, max]` row range
    pub y_range: [u32; 2],
    /// Number of deeper zoom levels bundled with this one
    pub span: u8,
}

impl ZoomBounds {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.x_range[0]..=self.x_range[1]).contains(&x)
            && (self.y_range[0]..=self.y_range[1]).contains(&y)
    }

    /// Deepest zoom level included in a bundle rooted at this zoom
    pub fn max_zoom(&self) -> u8 {
        self.zoom.saturating_add(self.span)
    }
}

impl TileBundleConfig {
    /// Bounds entry for `zoom`, if that zoom is supported
    pub fn bounds_for(&self, zoom: u8) -> Option<&ZoomBounds> {
        self.zooms.iter().find(|b| b.zoom == zoom)
    }
}

/// Elevation sampling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    /// Minimum distance between sampled track vertices (0 = every vertex)
    pub min_sample_spacing_m: f64,
}

impl WorkerConfig {
    /// Load configuration: explicit file (must exist) or default file (optional),
    /// then environment overrides, then validation.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                Some(path) => {
                    warn!(
                        "Config file {} not found, using environment and defaults",
                        path.display()
                    );
                    Self::default()
                }
                None => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply environment-style overrides; `lookup` returns the value of a variable.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("ENRICH_QUEUE_URL") {
            self.queue.base_url = v;
        }
        if let Some(v) = non_empty("ENRICH_QUEUE_TOKEN") {
            self.queue.token = v;
        }
        if let Some(v) = non_empty("ENRICH_QUEUE_INSTANCES") {
            self.queue.instances = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = non_empty("ENRICH_REGISTRY_URL") {
            self.registry.base_url = v;
        }
        if let Some(v) = non_empty("ENRICH_REGISTRY_TOKEN") {
            self.registry.token = Some(v);
        }
        if let Some(v) = non_empty("ENRICH_DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = non_empty("ENRICH_BACKOFF_SECONDS") {
            match v.trim().parse() {
                Ok(secs) => self.engine.backoff_seconds = secs,
                Err(_) => warn!("Ignoring ENRICH_BACKOFF_SECONDS={}: not a number", v),
            }
        }
        if let Some(v) = non_empty("ENRICH_PACKAGER_PATH") {
            self.tile_bundles.packager_path = v;
        }
        debug!("Environment overrides applied");
    }

    /// Check required keys and table consistency
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.queue.base_url.trim().is_empty() {
            missing.push("queue.base_url (ENRICH_QUEUE_URL)");
        }
        if self.queue.token.trim().is_empty() {
            missing.push("queue.token (ENRICH_QUEUE_TOKEN)");
        }
        if self.registry.base_url.trim().is_empty() {
            missing.push("registry.base_url (ENRICH_REGISTRY_URL)");
        }
        if self.database.url.trim().is_empty() {
            missing.push("database.url (ENRICH_DATABASE_URL)");
        }
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.engine.http_timeout_seconds == 0 {
            return Err(Error::Config(
                "engine.http_timeout_seconds must be positive".to_string(),
            ));
        }
        let spacing = self.elevation.min_sample_spacing_m;
        if !spacing.is_finite() || spacing < 0.0 {
            return Err(Error::Config(format!(
                "elevation.min_sample_spacing_m must be a finite, non-negative distance, got {}",
                spacing
            )));
        }

        self.validate_tile_bundles()
    }

    fn validate_tile_bundles(&self) -> Result<()> {
        let tiles = &self.tile_bundles;

        let mut seen = HashSet::new();
        for bounds in &tiles.zooms {
            if !seen.insert(bounds.zoom) {
                return Err(Error::Config(format!(
                    "tile_bundles.zooms lists zoom {} more than once",
                    bounds.zoom
                )));
            }
            if bounds.x_range[0] > bounds.x_range[1] || bounds.y_range[0] > bounds.y_range[1] {
                return Err(Error::Config(format!(
                    "tile_bundles.zooms entry for zoom {} has an inverted range",
                    bounds.zoom
                )));
            }
            if u16::from(bounds.zoom) + u16::from(bounds.span) > u16::from(MAX_ZOOM) {
                return Err(Error::Config(format!(
                    "tile_bundles.zooms entry for zoom {} with span {} goes past zoom {}",
                    bounds.zoom, bounds.span, MAX_ZOOM
                )));
            }
            // Inclusive ranges must stay below 2^zoom
            let tiles_per_axis = 1u64 << bounds.zoom;
            if u64::from(bounds.x_range[1]) >= tiles_per_axis
                || u64::from(bounds.y_range[1]) >= tiles_per_axis
            {
                return Err(Error::Config(format!(
                    "tile_bundles.zooms entry for zoom {} has ranges past {} tiles per axis",
                    bounds.zoom, tiles_per_axis
                )));
            }
        }

        if tiles.enabled {
            if tiles.source.as_deref().map_or(true, |s| s.trim().is_empty()) {
                return Err(Error::Config(
                    "tile_bundles.source is required when tile bundles are enabled".to_string(),
                ));
            }
            if tiles
                .artifact_base_url
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
            {
                return Err(Error::Config(
                    "tile_bundles.artifact_base_url is required when tile bundles are enabled"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// `<config_dir>/enrich/worker.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("enrich").join("worker.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.engine.backoff_seconds, 5);
        assert_eq!(config.engine.http_timeout_seconds, 10);
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.tile_bundles.packager_path, "tl");
        assert!(!config.tile_bundles.enabled);
    }

    #[test]
    fn test_zoom_bounds_inclusive() {
        let bounds = ZoomBounds {
            zoom: 9,
            x_range: [268, 277],
            y_range: [181, 192],
            span: 3,
        };
        assert!(bounds.contains(268, 181));
        assert!(bounds.contains(277, 192));
        assert!(!bounds.contains(267, 185));
        assert!(!bounds.contains(270, 193));
        assert_eq!(bounds.max_zoom(), 12);
    }

    fn valid_config() -> WorkerConfig {
        let mut config = WorkerConfig::default();
        config.queue.base_url = "http://queue.local".to_string();
        config.queue.token = "secret".to_string();
        config.registry.base_url = "http://registry.local".to_string();
        config.database.url = "postgres://localhost/enrich".to_string();
        config
    }

    fn with_zoom(zoom: u8, x_range: [u32; 2], y_range: [u32; 2], span: u8) -> WorkerConfig {
        let mut config = valid_config();
        config.tile_bundles.zooms = vec![ZoomBounds {
            zoom,
            x_range,
            y_range,
            span,
        }];
        config
    }

    #[test]
    fn test_zoom_table_limits() {
        assert!(with_zoom(9, [270, 275], [180, 190], 3).validate().is_ok());
        assert!(with_zoom(20, [0, 10], [0, 10], 4).validate().is_ok());

        // Bundle would reach past the deepest zoom
        assert!(matches!(
            with_zoom(20, [0, 10], [0, 10], 5).validate(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            with_zoom(25, [0, 0], [0, 0], 0).validate(),
            Err(Error::Config(_))
        ));

        // Zoom 2 has columns and rows 0..=3
        assert!(with_zoom(2, [0, 3], [0, 3], 0).validate().is_ok());
        assert!(matches!(
            with_zoom(2, [0, 4], [0, 3], 0).validate(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            with_zoom(2, [0, 3], [1, 4], 0).validate(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_sample_spacing_must_be_finite() {
        let mut config = valid_config();
        config.elevation.min_sample_spacing_m = 250.0;
        assert!(config.validate().is_ok());

        for bad in [f64::NAN, f64::INFINITY, -1.0] {
            config.elevation.min_sample_spacing_m = bad;
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{} accepted", bad);
        }
    }

    #[test]
    fn test_nan_spacing_rejected_from_toml() {
        let mut config =
            WorkerConfig::from_toml_str("[elevation]\nmin_sample_spacing_m = nan\n").unwrap();
        config.queue = valid_config().queue;
        config.registry = valid_config().registry;
        config.database = valid_config().database;
        assert!(config.elevation.min_sample_spacing_m.is_nan());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
