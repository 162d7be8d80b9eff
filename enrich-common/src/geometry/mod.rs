//! Geometry math
//!
//! Pure functions used by the job handlers: XYZ tile to geographic bounding box
//! conversion and great-circle distance. Projection of a point onto a line is not
//! done here; it needs the spatial store (see the worker's spatial gateway).

mod types;

pub use types::{
    BoundingBox, Geometry, Position, TileCoordinate, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT,
    MIN_LON,
};

use std::f64::consts::PI;

/// Mean earth radius used for great-circle distances, in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Converts an XYZ tile to its geographic bounding box (Web Mercator).
///
/// No range check is performed; see [`TileCoordinate::new`] for a validated
/// constructor.
#[inline]
pub fn tile_to_bounding_box(zoom: u8, x: u32, y: u32) -> BoundingBox {
    let n = 2.0_f64.powi(zoom as i32);
    let x = x as f64;
    let y = y as f64;

    BoundingBox {
        west: x / n * 360.0 - 180.0,
        east: (x + 1.0) / n * 360.0 - 180.0,
        north: mercator_lat(y, n),
        south: mercator_lat(y + 1.0, n),
    }
}

/// Inverse Web Mercator for a (possibly fractional) tile row
#[inline]
fn mercator_lat(y: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y / n)).sinh().atan() * 180.0 / PI
}

/// Great-circle distance between two positions in meters (haversine).
///
/// Elevation is ignored.
pub fn haversine_distance_meters(p1: &Position, p2: &Position) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let d_lat = (p2.lat - p1.lat).to_radians();
    let d_lon = (p2.lon - p1.lon).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Indices of `line` to sample so that consecutive picks are at least
/// `min_spacing_m` apart. First and last index are always included.
pub fn thin_by_distance(line: &[Position], min_spacing_m: f64) -> Vec<usize> {
    if line.is_empty() {
        return Vec::new();
    }
    let last = line.len() - 1;
    let mut picked = vec![0];
    let mut anchor = 0;

    for i in 1..last {
        if haversine_distance_meters(&line[anchor], &line[i]) >= min_spacing_m {
            picked.push(i);
            anchor = i;
        }
    }
    if last > 0 {
        picked.push(last);
    }
    picked
}
