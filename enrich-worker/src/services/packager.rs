//! Tile packaging tool wrapper
//!
//! Runs the external `tl` packager over a bounding box and zoom range, writing
//! an MBTiles bundle to a local path.

use crate::error::{EnrichmentError, EnrichmentResult};
use async_trait::async_trait;
use enrich_common::BoundingBox;
use std::path::Path;
use tokio::process::Command;

#[async_trait]
pub trait TilePackager: Send + Sync {
    /// Package tiles covering `bbox` for zooms `min_zoom..=max_zoom` into `output`
    async fn package(
        &self,
        bbox: BoundingBox,
        min_zoom: u8,
        max_zoom: u8,
        output: &Path,
    ) -> EnrichmentResult<()>;
}

/// External command-line packager
pub struct ExternalPackager {
    binary_path: String,
    source: String,
}

impl ExternalPackager {
    pub fn new(binary_path: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            source: source.into(),
        }
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }
}

/// Command-line arguments for one packaging run
pub fn packager_args(
    source: &str,
    bbox: &BoundingBox,
    min_zoom: u8,
    max_zoom: u8,
    output: &Path,
) -> Vec<String> {
    vec![
        "copy".to_string(),
        "-z".to_string(),
        min_zoom.to_string(),
        "-Z".to_string(),
        max_zoom.to_string(),
        "-b".to_string(),
        bbox.to_string(),
        source.to_string(),
        format!("mbtiles://{}", output.display()),
    ]
}

#[async_trait]
impl TilePackager for ExternalPackager {
    async fn package(
        &self,
        bbox: BoundingBox,
        min_zoom: u8,
        max_zoom: u8,
        output: &Path,
    ) -> EnrichmentResult<()> {
        let args = packager_args(&self.source, &bbox, min_zoom, max_zoom, output);
        tracing::debug!(binary = %self.binary_path, ?args, "Running tile packager");

        let result = Command::new(&self.binary_path).args(&args).output().await;
        let output_status = match result {
            Ok(out) => out,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EnrichmentError::domain(format!(
                    "packaging tool '{}' not found",
                    self.binary_path
                )));
            }
            Err(e) => {
                return Err(EnrichmentError::domain(format!(
                    "failed to run packaging tool '{}': {}",
                    self.binary_path, e
                )));
            }
        };

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            return Err(EnrichmentError::domain(format!(
                "packaging tool exited with {}: {}",
                output_status.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_packager_args() {
        let bbox = BoundingBox {
            west: 10.5,
            south: 42.5,
            east: 11.25,
            north: 43.0,
        };
        let args = packager_args(
            "http://tiles.local/{z}/{x}/{y}.png",
            &bbox,
            9,
            12,
            &PathBuf::from("/tmp/raster-9-1-2.mbtiles"),
        );
        assert_eq!(
            args,
            vec![
                "copy",
                "-z",
                "9",
                "-Z",
                "12",
                "-b",
                "10.5 42.5 11.25 43",
                "http://tiles.local/{z}/{x}/{y}.png",
                "mbtiles:///tmp/raster-9-1-2.mbtiles",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_domain_error() {
        let packager = ExternalPackager::new("/nonexistent/tl-binary", "source");
        let bbox = BoundingBox {
            west: 0.0,
            south: 0.0,
            east: 1.0,
            north: 1.0,
        };
        let err = packager
            .package(bbox, 1, 2, Path::new("/tmp/none.mbtiles"))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::Domain(_)));
        assert!(err.to_string().contains("not found"));
    }
}
