//! Common error types for the enrichment worker

use thiserror::Error;

/// Common result type for enrichment operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the worker crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input value (malformed job payload, bad parameter)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Geometry outside its valid domain (coordinate range, tile bounds)
    #[error("Geometry error: {0}")]
    Geometry(String),
}
