use anyhow::Context;
use std::future::Future;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use buspass::api::{
    self,
    middleware::session::{create_session_layer, AppState},
};
use buspass::config::Config;
use buspass::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "buspass=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting BusPass server...");

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!(max_connections = config.db_max_connections, "Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let session_layer = create_session_layer(pool.clone(), config.secure_cookies).await?;
    tracing::info!("Session layer initialized");

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid HOST/PORT: {}:{}", config.host, config.port))?;

    tracing::info!("Listening on {} (public URL {})", addr, config.base_url);

    let app = api::app(AppState::new(pool, config), session_layer);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await
}

/// Resolves once `signal` fires. A failed listener never resolves, so the
/// server keeps running instead of stopping right after it binds.
async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_triggers_shutdown() {
        let signal = async { Ok(()) };

        let done = tokio::time::timeout(Duration::from_millis(100), wait_for_shutdown(signal)).await;
        assert!(done.is_ok());
    }

    #[tokio::test]
    async fn test_broken_signal_listener_keeps_serving() {
        let broken = async {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "signal handler unavailable",
            ))
        };

        let done = tokio::time::timeout(Duration::from_millis(100), wait_for_shutdown(broken)).await;
        assert!(done.is_err());
    }
}
