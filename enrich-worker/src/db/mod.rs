//! Spatial store access
//!
//! PostGIS database holding the region polygons and the elevation raster.

pub mod spatial_gateway;

pub use spatial_gateway::{require_region_geometry, PgSpatialGateway, SpatialGateway};

use anyhow::Result;
use enrich_common::config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Initialize database connection pool and make sure worker tables exist
pub async fn init_database_pool(config: &DatabaseConfig, timeout: Duration) -> Result<PgPool> {
    tracing::debug!(max_connections = config.max_connections, "Connecting to spatial store");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(timeout)
        .connect(&config.url)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the regions table if it doesn't exist.
///
/// The `dem` raster table is provisioned outside the worker.
async fn init_tables(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS regions (
            id BIGINT PRIMARY KEY,
            name TEXT,
            geom geometry(MultiPolygon, 4326) NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS regions_geom_idx ON regions USING GIST (geom)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (regions)");

    Ok(())
}
