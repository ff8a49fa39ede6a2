//! HTTP server implementation.

use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::admission::{admission_middleware, AdmissionGate};
use super::handler;
use crate::error::{GatekeeperError, Result};

/// Build the service router with the admission gate in front of every route.
pub fn build_router(gate: Arc<AdmissionGate>) -> Router {
    let send_path = format!("{}/send", gate.path_prefix().trim_end_matches('/'));

    Router::new()
        .route(&send_path, post(handler::send_notification))
        .route("/health", get(handler::health))
        .layer(middleware::from_fn_with_state(gate, admission_middleware))
        .layer(TraceLayer::new_for_http())
}

/// HTTP server for the notification endpoint.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The admission gate shared by all requests
    gate: Arc<AdmissionGate>,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, gate: Arc<AdmissionGate>) -> Self {
        Self { addr, gate }
    }

    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.gate))
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            GatekeeperError::Io(e)
        })?;

        info!(
            addr = %self.addr,
            path_prefix = %self.gate.path_prefix(),
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                GatekeeperError::Io(e)
            })
    }
}
