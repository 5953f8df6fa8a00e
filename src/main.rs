//! PriceWatch Gateway - API proxy for the price-tracking frontend
//!
//! Serves the versioned API the web frontend calls, forwarding each request
//! to the backend service through one table-driven proxy engine, and resolves
//! hotlink-protected product image URLs.

mod auth;
mod config;
mod error;
mod handlers;
mod image_url;
mod models;
mod proxy;
mod routes;
mod upstream;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::CorsLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{config::Config, handlers::AppState, upstream::HttpUpstream};

/// Create the timeout layer (separate function to allow #[allow(deprecated)])
#[allow(deprecated)]
fn create_timeout_layer(timeout_secs: u64) -> tower_http::timeout::TimeoutLayer {
    tower_http::timeout::TimeoutLayer::new(Duration::from_secs(timeout_secs))
}

/// CORS for the listed origins, with credentials so the session cookie is sent
fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let config = Config::from_env();

    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        backend = %upstream::sanitize_url_for_logging(&config.backend_url),
        upstream_timeout = config.upstream_timeout,
        extended_upstream_timeout = config.extended_upstream_timeout,
        server_timeout = config.server_timeout,
        max_request_body_size = config.max_request_body_size,
        "Starting PriceWatch gateway"
    );

    info!(route_count = routes::ROUTES.len(), prefix = routes::API_PREFIX, "Loaded API routes");

    let upstream = Arc::new(HttpUpstream::new(&config)?);
    let state = AppState::new(config.clone(), upstream);

    // Layers are applied bottom-up, so the last layer added is the outermost
    let app = routes::router(state)
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(create_cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(create_timeout_layer(config.server_timeout));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signals (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
