//! Basin server binary.

use anyhow::{Context, Result};
use basin_core::config::AppConfig;
use basin_provider::ProviderRegistry;
use basin_server::tasks::{run_preprovision_loop, run_worker};
use basin_server::{create_router, AppState};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Basin - an Open Service Broker for S3 buckets
#[derive(Parser, Debug)]
#[command(name = "basind")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "BASIN_CONFIG")]
    config: Option<PathBuf>,

    /// Run the background task worker and preprovisioning loop instead of
    /// the API server
    #[arg(long = "background-tasks")]
    background_tasks: bool,
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

    tracing::info!("Basin v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    config.validate().map_err(anyhow::Error::msg)?;

    let store = basin_store::from_config(&config.database)
        .await
        .context("failed to initialize store")?;
    store
        .health_check()
        .await
        .context("store health check failed")?;
    tracing::info!("store initialized and schema verified");

    let providers = ProviderRegistry::from_config(&config.broker.name_prefix, &config.aws)
        .await
        .context("failed to initialize providers")?;
    tracing::info!("provider backends initialized");

    let state = AppState::new(config.clone(), store, Arc::new(providers));

    if args.background_tasks {
        tracing::info!("running in background-tasks mode");
        tokio::spawn(run_preprovision_loop(state.clone()));

        tokio::select! {
            result = run_worker(state) => {
                result.context("task worker failed")?;
            }
            _ = shutdown_signal() => {
                tracing::info!("shutdown signal received, stopping background tasks");
            }
        }
        return Ok(());
    }

    let addr = config.server.addr().context("invalid bind address")?;
    let app = create_router(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM. In-flight provider calls are not
/// cancelled; loops observe the signal at their next suspension point.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
