//! Geometry type definitions
//!
//! Geometries travel as GeoJSON between the feature registry, the worker and the
//! spatial store, so the serde representation here is the GeoJSON one.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Valid latitude range
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Highest zoom level accepted for tile coordinates
pub const MAX_ZOOM: u8 = 24;

/// A single coordinate: `[longitude, latitude, optional elevation]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Position {
    pub lon: f64,
    pub lat: f64,
    /// Elevation in meters, signed
    pub ele: Option<f64>,
}

impl Position {
    /// Create a validated 2-D position
    pub fn new(lon: f64, lat: f64) -> Result<Self> {
        if !(MIN_LON..=MAX_LON).contains(&lon) {
            return Err(Error::Geometry(format!("longitude {} out of range", lon)));
        }
        if !(MIN_LAT..=MAX_LAT).contains(&lat) {
            return Err(Error::Geometry(format!("latitude {} out of range", lat)));
        }
        Ok(Self { lon, lat, ele: None })
    }

    /// Same position with an elevation attached
    pub fn with_elevation(mut self, ele: f64) -> Self {
        self.ele = Some(ele);
        self
    }

    /// Drop the elevation component
    pub fn to_2d(self) -> Self {
        Self { ele: None, ..self }
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = Error;

    fn try_from(coords: Vec<f64>) -> Result<Self> {
        match coords.as_slice() {
            [lon, lat] => Position::new(*lon, *lat),
            [lon, lat, ele] => Ok(Position::new(*lon, *lat)?.with_elevation(*ele)),
            other => Err(Error::Geometry(format!(
                "position must have 2 or 3 components, got {}",
                other.len()
            ))),
        }
    }
}

impl From<Position> for Vec<f64> {
    fn from(p: Position) -> Self {
        match p.ele {
            Some(ele) => vec![p.lon, p.lat, ele],
            None => vec![p.lon, p.lat],
        }
    }
}

/// GeoJSON geometry subset handled by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// GeoJSON type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// All positions of the geometry, in document order
    pub fn positions(&self) -> Vec<Position> {
        match self {
            Geometry::Point(p) => vec![*p],
            Geometry::LineString(line) => line.clone(),
            Geometry::Polygon(rings) => rings.iter().flatten().copied().collect(),
            Geometry::MultiPolygon(polys) => {
                polys.iter().flatten().flatten().copied().collect()
            }
        }
    }

    /// True for `Polygon` and `MultiPolygon`
    pub fn is_areal(&self) -> bool {
        matches!(self, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
    }

    /// Serialize as GeoJSON text, the form bound to spatial store queries
    pub fn to_geojson_string(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::InvalidInput(format!("geometry serialization failed: {}", e)))
    }
}

/// Geographic rectangle in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl fmt::Display for BoundingBox {
    /// Space separated `west south east north`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.west, self.south, self.east, self.north)
    }
}

/// XYZ tile coordinate (Web Mercator, y = 0 at north).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoordinate {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoordinate {
    /// Create a tile coordinate that exists at its zoom level
    pub fn new(zoom: u8, x: u32, y: u32) -> Result<Self> {
        if zoom > MAX_ZOOM {
            return Err(Error::Geometry(format!("zoom {} exceeds {}", zoom, MAX_ZOOM)));
        }
        let n = 1u64 << zoom;
        if u64::from(x) >= n || u64::from(y) >= n {
            return Err(Error::Geometry(format!(
                "tile {}/{}/{} does not exist at zoom {}",
                zoom, x, y, zoom
            )));
        }
        Ok(Self { zoom, x, y })
    }

    /// Geographic bounding box covered by this tile
    pub fn bounding_box(&self) -> BoundingBox {
        super::tile_to_bounding_box(self.zoom, self.x, self.y)
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}
