//! Minimal HTTP server exposing a liveness endpoint.
//!
//! Always-on hosts (and the keep-alive ping) need something to GET.
//! Enabled by setting HEALTH_PORT.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;

/// Start the health HTTP server on the given port.
pub async fn start_health_server(port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/", get(health_handler));

    log::info!("Starting health server on http://{}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler() -> &'static str {
    "OK"
}
