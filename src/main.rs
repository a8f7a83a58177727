//! App Intelligence Gateway
//!
//! A REST gateway in front of a third-party app-intelligence API. It resolves
//! loosely specified app references (names, store ids, unified ids) to
//! concrete identifiers and returns metadata snapshots and sales summaries,
//! pacing every upstream call through a per-base-URL rate limiter.
//!
//! # Architecture
//!
//! - **Domain**: Identifier shapes, summary models and the upstream client trait
//! - **Application**: Name matching, identifier resolution and aggregation
//! - **Infrastructure**: Request pacing, retries and the HTTP client
//! - **API**: HTTP handlers, routing and middleware
//!
//! # Configuration
//!
//! The gateway reads `config.yaml` (optional) and environment variables:
//! - `APPINTEL_AUTH_TOKEN`: upstream auth token (also `SENSORTOWER_AUTH_TOKEN`,
//!   `SENSOR_TOWER_AUTH_TOKEN`, `SENSORTOWER_API_KEY`, `SENSOR_TOWER_API_KEY`)
//! - `PORT`: overrides `server.port`
//! - `RUST_LOG`: Logging level (default: info)
//! - `LOG_FORMAT`: `json` for structured logs
//!
//! # Quick Start
//!
//! ```bash
//! export APPINTEL_AUTH_TOKEN="your_token_here"
//! cargo run --release
//!
//! curl http://localhost:3010/health
//! curl "http://localhost:3010/v1/apps/resolve?app_query=Uber%20Eats&return_candidates=true"
//! curl "http://localhost:3010/v1/apps/sales?app_id=com.ubercab.eats&month=2026-01"
//! ```

use anyhow::Context;
use appintel_gateway::api::routes::create_router;
use appintel_gateway::api::state::AppState;
use appintel_gateway::application::AppIntelService;
use appintel_gateway::config::{AppConfig, IntelConfig};
use appintel_gateway::infrastructure::AppIntelClient;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = EnvFilter::new(env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let config = AppConfig::load(Path::new(&config_path))?;

    let intel_config = Arc::new(IntelConfig::from_raw(&config.intel));
    if intel_config.auth_token.is_empty() {
        tracing::warn!(
            "No upstream auth token found - set APPINTEL_AUTH_TOKEN in .env; app endpoints will answer with configuration errors"
        );
    }
    tracing::info!(
        base_url = %intel_config.base_url,
        requests_per_minute = intel_config.requests_per_minute,
        auth_mode = ?intel_config.auth_mode,
        "Upstream client configured"
    );

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    // Infrastructure
    let client = Arc::new(AppIntelClient::new(intel_config.clone()));

    // Application
    let intel_service = Arc::new(AppIntelService::new(client, intel_config));

    let state = AppState {
        intel_service,
        metrics_handle: Some(metrics_handle),
    };

    let app = create_router(state, &config.server.allowed_origins);

    // Allow PORT env var override
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(config.server.port);
    let addr = format!("{}:{}", config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    tracing::info!("App intelligence gateway running at http://{}", addr);

    // Graceful shutdown handling
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error during operation")?;

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C) to initiate graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
