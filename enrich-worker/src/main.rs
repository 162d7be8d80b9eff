//! Enrichment worker - Main entry point
//!
//! Loads configuration, connects the spatial store, wires the service clients
//! into the handler table and runs the job engine until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use enrich_common::config::WorkerConfig;
use enrich_worker::db::{self, PgSpatialGateway};
use enrich_worker::services::{ExternalPackager, HttpArtifactStore, HttpQueueClient, RegistryClient};
use enrich_worker::{build_registry, EngineSettings, HandlerServices, JobEngine, TileServices};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "enrich_worker=info,enrich_common=info";

/// Command-line arguments for enrich-worker
#[derive(Parser, Debug)]
#[command(name = "enrich-worker")]
#[command(about = "Geospatial enrichment worker")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "ENRICH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config first so its log_level can seed the filter
    let config = WorkerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let fallback_filter = config
        .log_level
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting enrichment worker v{}", env!("CARGO_PKG_VERSION"));
    info!(queue = %config.queue.base_url, registry = %config.registry.base_url, "Service endpoints");

    let timeout = Duration::from_secs(config.engine.http_timeout_seconds);

    let pool = db::init_database_pool(&config.database, timeout)
        .await
        .context("Failed to connect to spatial store")?;
    info!("Spatial store connected");

    let queue = Arc::new(
        HttpQueueClient::new(&config.queue, timeout).context("Failed to build queue client")?,
    );
    let registry = Arc::new(
        RegistryClient::new(&config.registry, timeout).context("Failed to build registry client")?,
    );
    let spatial = Arc::new(PgSpatialGateway::new(pool));

    let tiles = if config.tile_bundles.enabled {
        let bundles = &config.tile_bundles;
        let artifact_base_url = bundles
            .artifact_base_url
            .as_deref()
            .context("tile_bundles.artifact_base_url is required")?;
        let source = bundles
            .source
            .as_deref()
            .context("tile_bundles.source is required")?;
        let artifacts = HttpArtifactStore::new(artifact_base_url, timeout)
            .context("Failed to build artifact store client")?;
        info!(
            packager = %bundles.packager_path,
            zooms = bundles.zooms.len(),
            "Tile bundle generation enabled"
        );
        Some(TileServices {
            artifacts: Arc::new(artifacts),
            packager: Arc::new(ExternalPackager::new(bundles.packager_path.as_str(), source)),
            config: bundles.clone(),
        })
    } else {
        None
    };

    let services = HandlerServices {
        registry,
        spatial,
        tiles,
    };
    let handlers = build_registry(&services, &config.elevation);
    let settings = EngineSettings::from_config(&config.engine, &config.queue, &handlers);
    let engine = JobEngine::new(queue, handlers, settings);

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    engine.run(cancel_token).await;

    info!("Worker shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing current job");
        },
        _ = terminate => {
            info!("Received terminate signal, finishing current job");
        },
    }
}
