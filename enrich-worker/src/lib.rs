//! enrich-worker library
//!
//! Geospatial enrichment worker: pulls jobs from the queue service, runs the
//! matching handler against the feature registry and the spatial store, and
//! acknowledges the outcome.

pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use engine::{EngineSettings, EngineStats, JobEngine};
pub use error::{EnrichmentError, EnrichmentResult};
pub use handlers::{build_registry, HandlerRegistry, HandlerServices, JobHandler, TileServices};
