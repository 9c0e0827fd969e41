//! Bundler server binary.

use anyhow::{Context, Result};
use bundler_core::config::AppConfig;
use bundler_server::{AppState, create_router};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ENV_PREFIX: &str = "BUNDLER_";
const CONFIG_ENV: &str = "BUNDLER_CONFIG";

/// Bundler - push, pull and submit server for app projects
#[derive(Parser, Debug)]
#[command(name = "bundlerd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "BUNDLER_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Merge the optional TOML file with `BUNDLER_` environment variables.
fn load_config(config_path: &str, env: impl Iterator<Item = String>) -> Result<AppConfig> {
    let path = std::path::Path::new(config_path);
    let mut figment = Figment::new();
    let has_config_file = path.exists();

    if has_config_file {
        tracing::info!(config_path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", config_path);
    }

    let has_env_config = env
        .into_iter()
        .any(|key| key.starts_with(ENV_PREFIX) && key != CONFIG_ENV);

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: bundlerd --config /path/to/config.toml\n  \
             2. Environment variables: BUNDLER_SERVER__BIND=0.0.0.0:8080 \
             BUNDLER_STORAGE__TYPE=filesystem BUNDLER_STORAGE__PATH=/var/lib/bundler bundlerd\n\n\
             Set BUNDLER_CONFIG to change the default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
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

    tracing::info!("Bundler v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config, std::env::vars().map(|(key, _)| key))?;

    bundler_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = bundler_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend connectivity verified");

    let cache = bundler_storage::build_cache(storage.clone(), &config.cache)
        .context("failed to initialize blob cache")?;

    let metadata = bundler_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!(backend = metadata.backend_name(), "Metadata store initialized");

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, storage, cache, metadata)
        .context("failed to initialize application state")?;
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
