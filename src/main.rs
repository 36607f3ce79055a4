//! Meteobridge Binary Entry Point
//!
//! Loads configuration, then runs the bridge until SIGINT or SIGTERM.
//! Core functionality is provided by the `meteobridge` library crate.

use clap::Parser;
use meteobridge::{AppConfig, Supervisor, config::parse_duration};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Meteobridge - Weather Telemetry Bridge
#[derive(Parser, Debug)]
#[command(name = "meteobridge", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "METEOBRIDGE_CONFIG"
    )]
    config: String,

    /// Broker host (overrides config file)
    #[arg(long, env = "METEOBRIDGE_BROKER_HOST")]
    broker_host: Option<String>,

    /// Database URL (overrides config file)
    #[arg(long, env = "METEOBRIDGE_DATABASE_URL")]
    database_url: Option<String>,

    /// Poll interval, e.g. "10m" (overrides config file)
    #[arg(long, env = "METEOBRIDGE_FETCH_INTERVAL", value_parser = parse_duration)]
    fetch_interval: Option<std::time::Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,meteobridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Meteobridge - Weather Telemetry Bridge");

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(host) = cli.broker_host {
        config.broker.host = host;
    }
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if let Some(interval) = cli.fetch_interval {
        config.pipeline.fetch_interval = interval;
    }
    config.validate()?;

    tracing::info!(
        endpoint = %config.source.endpoint,
        broker = %format!("{}:{}", config.broker.host, config.broker.port),
        topic = %config.broker.topic,
        database = %config.database.driver()?,
        fetch_interval = %humantime::format_duration(config.pipeline.fetch_interval),
        "Configuration loaded"
    );

    let supervisor = Supervisor::from_config(&config)?;
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    supervisor.run(cancel).await;
    tracing::info!("Meteobridge stopped");
    Ok(())
}

/// Cancel the pipeline on Ctrl+C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    cancel.cancel();
}
