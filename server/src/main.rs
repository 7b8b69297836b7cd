//! dockweb server - live container log relay
//!
//! This is the main entry point for the dockweb service.
//! It talks to the Docker/Podman API and relays container logs to browser
//! clients over WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::http::{HeaderName, HeaderValue};
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use dockweb_server::api::{create_router, mark_started};
use dockweb_server::config::AppConfig;
use dockweb_server::logging::init_logging;
use dockweb_server::runtime::{DockerRuntime, RuntimeApi};
use dockweb_server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    mark_started();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.log_level, config.log_dir.as_deref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting dockweb server"
    );

    // Initialize metrics system
    dockweb_server::metrics::init_metrics()?;
    info!("Prometheus metrics initialized");

    // Connect to the container runtime
    let runtime = DockerRuntime::connect(config.docker_host.as_deref())?;
    match runtime.ping().await {
        Ok(info) => info!(
            version = ?info.version,
            api_version = ?info.api_version,
            "Container runtime connected"
        ),
        Err(e) => warn!(error = %e, "Container runtime not reachable, health will report degraded"),
    }

    // Create shared application state
    let state = Arc::new(AppState::new(config.clone(), Arc::new(runtime)));

    // Build the router with all routes and middleware
    let x_request_id = HeaderName::from_static("x-request-id");
    let app = create_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .layer(cors_layer(&config.allowed_origins));

    // Bind to address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(%addr, "Listening on");

    // Create the server
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Relay sessions hold their connections open, so stop them before the
    // server waits on in-flight requests
    let relays = state.relays.clone();
    let shutdown = async move {
        shutdown_signal().await;
        relays.begin_shutdown();
    };

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Shutting down...");

    let remaining = state.relays.wait_idle(config.shutdown_grace()).await;
    if remaining > 0 {
        warn!(remaining, "Relay sessions still open after shutdown grace period");
    }

    info!("dockweb server stopped");
    Ok(())
}

/// CORS restricted to the configured origins
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim_end_matches('/')) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid allowed origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Handle shutdown signals gracefully
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
