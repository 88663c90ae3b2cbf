use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use snip::app::{open_storage, App};
use snip::config::{AuthMode, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage = open_storage(&config.database).await?;
    let app = App::build(&config, storage)?;

    match config.auth.mode {
        AuthMode::None => {
            info!("🔓 Authentication is disabled - every request acts as a local admin");
        }
        AuthMode::Jwt => {
            info!("🔐 Bearer token authentication enabled");
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_task = Arc::clone(&app.sweeper).spawn(shutdown_rx);
    info!(
        policy = ?config.sweeper.policy,
        interval_secs = config.sweeper.interval_secs,
        "Expiry sweeper started"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Listening on http://{}", addr);
    info!("   - API endpoints available at http://{}/api/...", addr);
    info!("   - Short links resolve at {}/<code>", config.base_url);

    axum::serve(
        listener,
        app.router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_task.await {
        tracing::error!("Sweeper task failed: {e}");
    }
    app.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
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
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
