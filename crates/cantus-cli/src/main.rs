//! Server entry point.
//!
//! Loads `.env` and `CANTUS_*` settings, applies CLI overrides, wires
//! the service through the bootstrap composition root and serves HTTP
//! until SIGINT/SIGTERM, then drains: the gateway answers 503 for new
//! jobs while in-flight work gets the configured grace window.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cantus_axum::{bootstrap, create_router, AppState};
use cantus_core::settings::{Device, Settings};

#[derive(Debug, Parser)]
#[command(name = "cantusd", about = "Job-oriented speech synthesis service", version)]
struct Cli {
    /// HTTP listen port (overrides CANTUS_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Root data directory (overrides CANTUS_DATA_DIR).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Compute device: cuda or cpu (overrides CANTUS_DEVICE).
    #[arg(long)]
    device: Option<Device>,

    /// Worker pool size (overrides CANTUS_MAX_CONCURRENT_JOBS).
    #[arg(long)]
    workers: Option<usize>,

    /// Inference sidecar base URL (overrides CANTUS_ENGINE_URL).
    #[arg(long)]
    engine_url: Option<String>,
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::from_env().context("invalid configuration")?;
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(data_dir) = &cli.data_dir {
        settings.data_dir = data_dir.clone();
        settings.artifact_dir = data_dir.join("artifacts");
        settings.voice_dir = data_dir.join("voice_profiles");
        settings.upload_dir = data_dir.join("uploads");
        settings.database_path = data_dir.join("cantus.db");
    }
    if let Some(device) = cli.device {
        settings.device = device;
    }
    if let Some(workers) = cli.workers {
        settings.max_concurrent_jobs = workers;
    }
    if let Some(engine_url) = &cli.engine_url {
        settings.engine_url = engine_url.clone();
    }
    settings.validate().context("invalid configuration")?;
    Ok(settings)
}

async fn shutdown_signal(context: AppState) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "could not install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received, draining");
    context.begin_shutdown();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;
    let port = settings.port;

    tracing::info!(
        port,
        device = %settings.device,
        workers = settings.max_concurrent_jobs,
        data_dir = %settings.data_dir.display(),
        "starting cantus"
    );

    let (context, workers) = bootstrap(settings).await?;
    let router = create_router(context.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("could not bind port {port}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(context))
        .await
        .context("server error")?;

    // Give in-flight jobs their grace window, then stop the pool.
    workers.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}
