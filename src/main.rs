use anyhow::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use logsim_backend::{api::AppState, config::Config, create_router};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so the log format can follow it
    let config = Config::load()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        environment = %config.environment,
        port = config.port,
        tick_interval_ms = config.tick_interval_ms,
        "Starting Log Simulator Backend"
    );

    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // Build application state
    let state = AppState::new(config.clone()).with_prometheus(prometheus);

    // Scheduler loop
    let shutdown = CancellationToken::new();
    let scheduler = state
        .engine
        .scheduler(Duration::from_millis(config.tick_interval_ms.max(1)));
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    scheduler_task.await?;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        }
        _ = shutdown.cancelled() => {}
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
