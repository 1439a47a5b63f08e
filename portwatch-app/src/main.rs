use anyhow::{Context, Result};
use clap::Parser;
use portwatch_api::{ApiServer, AppState};
use portwatch_app::{load_dataset, startup_summary, Overrides};
use portwatch_config::{ConfigManager, DEFAULT_CONFIG_FILE};
use portwatch_ingest::IngestionGateway;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, env = "PORTWATCH_CONFIG")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Always download, ignoring a fresh cache
    #[arg(long)]
    no_cache: bool,

    /// Keep only this share of the rows, between 0 and 1
    #[arg(long)]
    sample_fraction: Option<f64>,

    /// Disable API server
    #[arg(long)]
    no_api: bool,

    /// API port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.debug);

    info!("Starting PortWatch Analytics");

    let mut manager = ConfigManager::load(Some(&args.config))
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    Overrides {
        no_cache: args.no_cache,
        sample_fraction: args.sample_fraction,
        port: args.port,
    }
    .apply(manager.get_config_mut());
    manager.validate()?;
    let config = manager.into_config();

    let gateway = IngestionGateway::from_config(&config)?;
    let loaded = load_dataset(&gateway, &config)
        .await
        .context("loading port traffic data")?;

    info!(
        origin = ?loaded.origin,
        observations = loaded.dataset.len(),
        ports = loaded.dataset.ports().len(),
        "Dataset ready"
    );

    startup_summary(&loaded.dataset, &config);

    if args.no_api {
        info!("API server disabled, exiting");
        return Ok(());
    }

    let server = ApiServer::new(&config, AppState::new(loaded.dataset, config.clone()));
    server.run_until(shutdown_signal()).await?;

    info!("PortWatch Analytics stopped");

    Ok(())
}

fn init_logging(debug: bool) {
    let env_filter = if debug { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        }
    }
}
