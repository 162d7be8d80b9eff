//! Spatial gateway
//!
//! Narrow interface over the store's predicate and measurement primitives.
//! Geometries are always bound as GeoJSON parameters; no query text is ever
//! built from job input.

use crate::error::{EnrichmentError, EnrichmentResult};
use async_trait::async_trait;
use enrich_common::{Geometry, Position};
use sqlx::PgPool;

/// Spatial predicates, measurements and region persistence
#[async_trait]
pub trait SpatialGateway: Send + Sync {
    /// 2-D intersection test between two geometries
    async fn intersects(&self, a: &Geometry, b: &Geometry) -> EnrichmentResult<bool>;

    /// Ids of stored regions intersecting `geometry` (2-D), ascending
    async fn intersecting_regions(&self, geometry: &Geometry) -> EnrichmentResult<Vec<i64>>;

    /// Length on the ellipsoid, in meters
    async fn length_meters(&self, geometry: &Geometry) -> EnrichmentResult<f64>;

    /// Fraction in `[0, 1]` of the point's projection along the line
    async fn line_locate_fraction(
        &self,
        line: &Geometry,
        point: &Position,
    ) -> EnrichmentResult<f64>;

    /// Elevation raster value at a location; `None` outside coverage or nodata
    async fn sample_raster(&self, lon: f64, lat: f64) -> EnrichmentResult<Option<f64>>;

    /// Insert the region or overwrite its geometry and name
    async fn upsert_region(
        &self,
        id: i64,
        name: Option<&str>,
        geometry: &Geometry,
    ) -> EnrichmentResult<()>;
}

/// PostGIS implementation
#[derive(Clone)]
pub struct PgSpatialGateway {
    pool: PgPool,
}

impl PgSpatialGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INTERSECTS_SQL: &str = "SELECT ST_Intersects(\
        ST_Force2D(ST_SetSRID(ST_GeomFromGeoJSON($1), 4326)), \
        ST_Force2D(ST_SetSRID(ST_GeomFromGeoJSON($2), 4326)))";

const INTERSECTING_REGIONS_SQL: &str = "SELECT id FROM regions \
        WHERE ST_Intersects(ST_Force2D(geom), ST_Force2D(ST_SetSRID(ST_GeomFromGeoJSON($1), 4326))) \
        ORDER BY id";

const LENGTH_SQL: &str =
    "SELECT ST_Length(ST_Force2D(ST_SetSRID(ST_GeomFromGeoJSON($1), 4326))::geography)";

// Both inputs are projected to Web Mercator before locating.
const LINE_LOCATE_SQL: &str = "SELECT ST_LineLocatePoint(\
        ST_Transform(ST_Force2D(ST_SetSRID(ST_GeomFromGeoJSON($1), 4326)), 3857), \
        ST_Transform(ST_SetSRID(ST_MakePoint($2, $3), 4326), 3857))";

const SAMPLE_RASTER_SQL: &str = "SELECT ST_Value(rast, ST_SetSRID(ST_MakePoint($1, $2), 4326)) \
        FROM dem \
        WHERE ST_Intersects(rast, ST_SetSRID(ST_MakePoint($1, $2), 4326)) \
        LIMIT 1";

const UPSERT_REGION_SQL: &str = "INSERT INTO regions (id, name, geom, updated_at) \
        VALUES ($1, $2, ST_Multi(ST_Force2D(ST_SetSRID(ST_GeomFromGeoJSON($3), 4326))), now()) \
        ON CONFLICT (id) DO UPDATE \
        SET name = EXCLUDED.name, geom = EXCLUDED.geom, updated_at = EXCLUDED.updated_at";

/// Regions are stored as MultiPolygons; anything non-areal is rejected
pub fn require_region_geometry(id: i64, geometry: &Geometry) -> EnrichmentResult<()> {
    if geometry.is_areal() {
        Ok(())
    } else {
        Err(EnrichmentError::domain(format!(
            "region {} must be a Polygon or MultiPolygon, got {}",
            id,
            geometry.type_name()
        )))
    }
}

#[async_trait]
impl SpatialGateway for PgSpatialGateway {
    async fn intersects(&self, a: &Geometry, b: &Geometry) -> EnrichmentResult<bool> {
        let hit = sqlx::query_scalar::<_, Option<bool>>(INTERSECTS_SQL)
            .bind(a.to_geojson_string()?)
            .bind(b.to_geojson_string()?)
            .fetch_one(&self.pool)
            .await?;
        Ok(hit.unwrap_or(false))
    }

    async fn intersecting_regions(&self, geometry: &Geometry) -> EnrichmentResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(INTERSECTING_REGIONS_SQL)
            .bind(geometry.to_geojson_string()?)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn length_meters(&self, geometry: &Geometry) -> EnrichmentResult<f64> {
        let length = sqlx::query_scalar::<_, Option<f64>>(LENGTH_SQL)
            .bind(geometry.to_geojson_string()?)
            .fetch_one(&self.pool)
            .await?;
        length.ok_or_else(|| {
            EnrichmentError::domain(format!("store returned no length for {}", geometry.type_name()))
        })
    }

    async fn line_locate_fraction(
        &self,
        line: &Geometry,
        point: &Position,
    ) -> EnrichmentResult<f64> {
        let fraction = sqlx::query_scalar::<_, Option<f64>>(LINE_LOCATE_SQL)
            .bind(line.to_geojson_string()?)
            .bind(point.lon)
            .bind(point.lat)
            .fetch_one(&self.pool)
            .await?;
        fraction
            .map(|f| f.clamp(0.0, 1.0))
            .ok_or_else(|| EnrichmentError::domain("store could not locate point on line"))
    }

    async fn sample_raster(&self, lon: f64, lat: f64) -> EnrichmentResult<Option<f64>> {
        let value = sqlx::query_scalar::<_, Option<f64>>(SAMPLE_RASTER_SQL)
            .bind(lon)
            .bind(lat)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.flatten())
    }

    async fn upsert_region(
        &self,
        id: i64,
        name: Option<&str>,
        geometry: &Geometry,
    ) -> EnrichmentResult<()> {
        require_region_geometry(id, geometry)?;

        sqlx::query(UPSERT_REGION_SQL)
            .bind(id)
            .bind(name)
            .bind(geometry.to_geojson_string()?)
            .execute(&self.pool)
            .await?;

        tracing::debug!(region_id = id, "Region upserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_are_parameterized() {
        for sql in [
            INTERSECTS_SQL,
            INTERSECTING_REGIONS_SQL,
            LENGTH_SQL,
            LINE_LOCATE_SQL,
            SAMPLE_RASTER_SQL,
            UPSERT_REGION_SQL,
        ] {
            assert!(sql.contains("$1"), "{}", sql);
            assert!(!sql.contains('{'), "query text must not be a format template: {}", sql);
        }
    }

    #[test]
    fn test_region_geometry_must_be_areal() {
        let ring = vec![
            Position::new(10.0, 43.0).unwrap(),
            Position::new(11.0, 43.0).unwrap(),
            Position::new(11.0, 44.0).unwrap(),
            Position::new(10.0, 43.0).unwrap(),
        ];
        assert!(require_region_geometry(1, &Geometry::Polygon(vec![ring.clone()])).is_ok());
        assert!(require_region_geometry(1, &Geometry::MultiPolygon(vec![vec![ring]])).is_ok());

        let err = require_region_geometry(7, &Geometry::Point(Position::new(10.0, 43.0).unwrap()))
            .unwrap_err();
        assert_eq!(err.to_string(), "region 7 must be a Polygon or MultiPolygon, got Point");
    }

    #[test]
    fn test_predicates_are_two_dimensional() {
        assert_eq!(INTERSECTS_SQL.matches("ST_Force2D").count(), 2);
        assert_eq!(INTERSECTING_REGIONS_SQL.matches("ST_Force2D").count(), 2);
    }
}
