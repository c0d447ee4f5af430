//! Pantry proxy binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use pantry_core::config::AppConfig;
use pantry_server::bootstrap::{reload_worker, seed_retrieval_config, start_worker};
use pantry_server::network::HttpNetwork;
use pantry_server::retrieval::GatewayClientBuilder;
use pantry_server::{AppState, Controller, create_router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pantry - a content-addressed caching proxy
#[derive(Parser, Debug)]
#[command(name = "pantryd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "PANTRY_CONFIG",
        default_value = "config/pantry.toml"
    )]
    config: String,
}

/// Load configuration (file is optional, env vars can provide/override everything).
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!("No config file found at {}, using defaults and environment", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("PANTRY_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Startup banner
    tracing::info!("Pantry v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(load_config(&args.config)?);

    // Register Prometheus metrics
    pantry_server::metrics::register_metrics();

    // Initialize storage backend
    let datastore =
        pantry_storage::from_config(&config.storage).context("failed to initialize storage")?;
    tracing::info!(backend = datastore.backend_name(), "Storage backend initialized");

    let timeout = config.server.request_timeout();
    let builder = GatewayClientBuilder::new(timeout).context("failed to build HTTP client")?;
    let network = HttpNetwork::new(timeout).context("failed to build HTTP client")?;
    let controller = Arc::new(
        Controller::new(
            &config.server,
            datastore.clone(),
            Arc::new(builder),
            Arc::new(network),
        )
        .context("invalid server configuration")?,
    );

    seed_retrieval_config(&controller, config.retrieval.as_ref())
        .await
        .context("failed to persist retrieval configuration")?;

    let generation = start_worker(&controller, &config.worker)
        .await
        .context("worker installation failed")?;
    tracing::info!(generation, origin = %controller.origin(), "Worker active");

    spawn_reload_listener(controller.clone(), config.clone());

    // Create router
    let app = create_router(AppState::new(config.clone(), controller));

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    datastore.close().await.context("failed to close storage")?;
    tracing::info!("Shut down");
    Ok(())
}

/// Reinstall and activate a new generation on SIGHUP.
#[cfg(unix)]
fn spawn_reload_listener(controller: Arc<Controller>, config: Arc<AppConfig>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "SIGHUP handler unavailable, reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading worker");
            match reload_worker(&controller, &config.worker).await {
                Ok(generation) => tracing::info!(generation, "Worker reloaded"),
                Err(e) => tracing::error!(error = %e, "Reload failed, keeping current generation"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_controller: Arc<Controller>, _config: Arc<AppConfig>) {}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
