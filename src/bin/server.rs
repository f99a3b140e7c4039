//! Dispatch server entry point: parse the CLI, wire up the repository
//! (in-memory + JSON snapshot, or durable sqlite), spawn the reaper and
//! the background persist loop, and serve the HTTP API.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dispatch_server::config::{Cli, ServerConfig};
use dispatch_server::coordinator::Coordinator;
use dispatch_server::persist::AsyncPersist;
use dispatch_server::reaper::Reaper;
use dispatch_server::repository::{MemoryRepository, Repository, SqliteRepository};
use dispatch_server::server::build_app;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let config = ServerConfig::from_cli(Cli::parse()).context("invalid configuration")?;
    tracing::info!(port = config.port, database = %config.database, "starting dispatch server");

    let (repo, persist): (Arc<dyn Repository>, Arc<AsyncPersist>) = if config.is_in_memory() {
        let snapshot = AsyncPersist::load(&config.snapshot_path).await;
        let repo = Arc::new(MemoryRepository::new());
        repo.restore(snapshot).await.context("failed to restore snapshot")?;
        (repo, Arc::new(AsyncPersist::new(Some(config.snapshot_path.clone()))))
    } else {
        let repo = SqliteRepository::connect(&config.database)
            .await
            .context("failed to open sqlite database")?;
        (Arc::new(repo), Arc::new(AsyncPersist::new(None)))
    };

    let coordinator = Arc::new(Coordinator::new(repo.clone(), persist.clone(), config.scheduler));
    let api_key = Some(config.api_key).filter(|k| !k.is_empty());
    let app = build_app(coordinator.clone(), api_key);

    let shutdown = CancellationToken::new();

    let persist_task = {
        let persist = persist.clone();
        let repo = repo.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = persist.run(repo, shutdown).await {
                tracing::error!(error = %err, "persist loop exited with an error");
            }
        })
    };

    let reaper_task = {
        let reaper = Reaper::new(coordinator, config.reaper);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { reaper.run(shutdown).await })
    };

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with an error")?;

    shutdown.cancel();
    let _ = tokio::join!(persist_task, reaper_task);
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
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
    tracing::info!("shutdown signal received");
}
