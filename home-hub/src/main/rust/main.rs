use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use home_hub::infrastructure::devices::SysfsGpio;
use home_hub::infrastructure::http;
use home_hub::{build_hub, serve_metrics, Adapters, Config, FfmpegLauncher, HubConfig, PrometheusReporter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    // Initialize logging
    let filter = if config.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Initialize metrics
    PrometheusReporter::init_metrics()?;

    let hub_config = HubConfig::load(&config.config)?;
    let http_port = config.http_port(&hub_config)?;

    info!("Starting home hub");
    info!("  Config file: {}", config.config.display());
    info!("  HTTP port: {}", http_port);
    info!("  Metrics port: {}", config.metrics_port);
    info!("  Decoder: {}", config.ffmpeg_path.display());

    // Create infrastructure implementations (dependency injection)
    let adapters = Adapters {
        launcher: Arc::new(FfmpegLauncher::new(&config.ffmpeg_path)),
        gpio: Arc::new(SysfsGpio::new(&config.gpio_root)),
        metrics: Arc::new(PrometheusReporter::new()),
    };

    let mut runtime = build_hub(&hub_config, adapters).await?;

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    runtime.start_polling(shutdown_rx.clone());

    let metrics_server = tokio::spawn(serve_metrics(config.metrics_port, wait_for(shutdown_rx.clone())));

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let (addr, server) = http::bind(Arc::clone(runtime.hub()), addr, wait_for(shutdown_rx))?;
    info!("Hub listening on http://{}", addr);
    let http_server = tokio::spawn(server);

    // Handle Ctrl+C
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    // Streaming responses never end on their own, so the decoders go first
    runtime.shutdown().await;
    http_server.abort();
    metrics_server.await?;

    info!("Hub shutdown complete");
    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
