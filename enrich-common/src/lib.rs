//! # Enrich Common Library
//!
//! Shared code for the enrichment worker including:
//! - Configuration loading (TOML file + environment overrides)
//! - Geometry value types and the pure geometry math used by job handlers
//! - The queue job model and parameter decoding
//! - Common error type

pub mod config;
pub mod error;
pub mod geometry;
pub mod job;

pub use error::{Error, Result};
pub use geometry::{BoundingBox, Geometry, Position, TileCoordinate};
pub use job::{Job, JobParameters};
