//! LAMP-PRo Classification Server entry point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

use lampro_server::config::Config;
use lampro_server::logic::model::Backend;
use lampro_server::logic::service::{PredictionService, ServiceSettings};
use lampro_server::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().map_err(anyhow::Error::msg)?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lampro_server=debug,tower_http=debug".into());
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    config.validate().context("Invalid configuration")?;

    tracing::info!("LAMP-PRo server starting ({})...", config.environment);
    tracing::info!(
        "Backend: {:?}, max length {}, concurrency {}, timeout {}ms",
        config.backend,
        config.max_sequence_length,
        config.max_concurrency,
        config.request_timeout_ms
    );

    // Load models once, before accepting traffic
    let backend = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || Backend::load(&config))
            .await
            .context("Model loader panicked")?
            .context("Failed to load scoring backend")?
    };

    let service = PredictionService::new(backend, ServiceSettings::from(&config));

    // Build application state
    let state = AppState {
        service: Arc::new(service),
        config: config.clone(),
    };

    let app = create_router(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let status = state.service.status();
    drop(state);
    tracing::info!(
        "Server stopped after {} predictions, models unloaded",
        status.inference_count
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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

    tracing::info!("Shutdown signal received, draining in-flight requests");
}
