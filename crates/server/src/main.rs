//! STOW-RS ingest server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use stow_core::config::AppConfig;
use stow_server::{AppState, create_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// stowd - DICOMweb STOW-RS ingest server
#[derive(Parser, Debug)]
#[command(name = "stowd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "STOW_CONFIG", default_value = "config/server.toml")]
    config: String,
}

/// Merge the optional configuration file with `STOW_` environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    let has_config_file = std::path::Path::new(path).exists();

    if has_config_file {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("STOW_") && key != "STOW_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: stowd --config /path/to/config.toml\n  \
             2. Environment variables: STOW_SERVER__BIND=0.0.0.0:8080 \
             STOW_STORAGE__TYPE=filesystem STOW_STORAGE__PATH=/var/lib/stow stowd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set STOW_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("STOW_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("stowd v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    stow_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let store = stow_storage::from_config(&config.storage)
        .await
        .context("failed to initialize instance store")?;
    tracing::info!(backend = store.backend_name(), "Instance store initialized");

    // Fail fast instead of accepting requests that can never be persisted.
    store
        .health_check()
        .await
        .context("instance store health check failed")?;
    tracing::info!("Instance store verified");

    let spool_directory = &config.stow.spool_directory;
    tokio::fs::create_dir_all(spool_directory)
        .await
        .with_context(|| {
            format!(
                "failed to create spool directory {}",
                spool_directory.display()
            )
        })?;
    tracing::info!(spool_directory = %spool_directory.display(), "Spool directory ready");

    let state = AppState::new(config.clone(), store);
    tracing::info!(
        entities = state.registry.len(),
        "Application entities registered"
    );

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
