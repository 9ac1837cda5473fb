//! Logship Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::info;

use logship_common::logging::{init_logging, LogConfig};
use logship_server::{
    api::{self, ApiState},
    config::Config,
    ingest::{
        stats::{Health, ParserStats, ShipperStats},
        LogFetcher, LogParser, Shipper,
    },
    search::ElasticsearchClient,
    storage::{config::StorageConfig, Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::from_env()?;
    init_logging(&log_config)?;

    info!("Starting logship server");

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Initialize S3/MinIO storage
    let storage_config = StorageConfig::from_env()?;
    let storage = Storage::new(storage_config).await?;
    info!("Storage client initialized");

    let search = ElasticsearchClient::new(config.search.url.clone());
    info!("Elasticsearch client initialized for {}", config.search.url);

    // Injectable pipeline state, read by the status endpoint
    let parser_stats = Arc::new(ParserStats::new());
    let shipper_stats = Arc::new(ShipperStats::new());
    let storage_health = Health::new();

    // The to-do channel is bounded to one claim batch; its fullness doubles
    // as the fetcher's replenish test. The record channel is unbounded and
    // can grow without limit while Elasticsearch is unreachable.
    let (to_do_tx, to_do_rx) = mpsc::channel(config.ingest.file_batch_size);
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let (record_tx, record_rx) = mpsc::unbounded_channel();

    let fetcher = LogFetcher::new(
        storage,
        config.ingest.clone(),
        to_do_tx,
        done_tx.clone(),
        done_rx,
        storage_health.clone(),
    );
    let parser = LogParser::new(to_do_rx, done_tx, record_tx.clone(), parser_stats.clone())?;
    let shipper = Shipper::new(
        search.clone(),
        record_rx,
        record_tx,
        config.search.index_pattern.clone(),
        shipper_stats.clone(),
    );

    tokio::spawn(fetcher.run());
    tokio::spawn(parser.run());
    tokio::spawn(shipper.run());
    info!("Pipeline workers started");

    // Build the status router
    let state = ApiState {
        parser_stats,
        shipper_stats,
        storage_health,
        search: Arc::new(search),
    };
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Status endpoint listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // The workers have no drain protocol: on shutdown they die with the
    // process and anything in flight stays under the processing prefix.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give in-flight status requests time to complete
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
