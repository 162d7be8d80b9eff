//! Feature snapshot and patch types
//!
//! The registry owns the authoritative record. The worker reads a snapshot and
//! writes back a partial patch containing only the fields it derived.

use crate::error::{EnrichmentError, EnrichmentResult};
use enrich_common::{Geometry, Position};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Feature type tag; also the registry path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Track,
    Poi,
    Media,
    /// Administrative "where" region
    Region,
}

impl FeatureKind {
    pub fn path_segment(&self) -> &'static str {
        match self {
            FeatureKind::Track => "track",
            FeatureKind::Poi => "poi",
            FeatureKind::Media => "media",
            FeatureKind::Region => "region",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// GeoJSON-like feature snapshot returned by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: i64,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Point embedded in a track's `related_pois` property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedPoint {
    pub id: i64,
    pub geometry: Geometry,
}

impl Feature {
    pub fn new(id: i64, geometry: Geometry) -> Self {
        Self {
            id,
            geometry: Some(geometry),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    /// Geometry or a domain error naming the feature
    pub fn require_geometry(&self, kind: FeatureKind) -> EnrichmentResult<&Geometry> {
        self.geometry
            .as_ref()
            .ok_or_else(|| EnrichmentError::domain(format!("{} {} has no geometry", kind, self.id)))
    }

    /// Vertices of a `LineString` geometry
    pub fn require_line(&self, kind: FeatureKind) -> EnrichmentResult<&[Position]> {
        match self.require_geometry(kind)? {
            Geometry::LineString(line) if line.len() >= 2 => Ok(line),
            Geometry::LineString(_) => Err(EnrichmentError::domain(format!(
                "{} {} line has fewer than 2 vertices",
                kind, self.id
            ))),
            other => Err(EnrichmentError::domain(format!(
                "{} {} has {} geometry, expected LineString",
                kind,
                self.id,
                other.type_name()
            ))),
        }
    }

    /// Position of a `Point` geometry
    pub fn require_point(&self, kind: FeatureKind) -> EnrichmentResult<Position> {
        match self.require_geometry(kind)? {
            Geometry::Point(p) => Ok(*p),
            other => Err(EnrichmentError::domain(format!(
                "{} {} has {} geometry, expected Point",
                kind,
                self.id,
                other.type_name()
            ))),
        }
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Related points embedded in the record; absent or null means none
    pub fn related_points(&self) -> EnrichmentResult<Vec<RelatedPoint>> {
        match self.properties.get("related_pois") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                EnrichmentError::domain(format!(
                    "feature {} has malformed related_pois: {}",
                    self.id, e
                ))
            }),
        }
    }
}

/// Partial field map sent back to the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeaturePatch(Map<String, Value>);

impl FeaturePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
