use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::engine::Monitor;
use crate::state::StoreSnapshot;

/// Runs an on-demand live and build check and returns the summary text.
pub async fn get_status(State(monitor): State<Arc<Monitor>>) -> String {
    monitor.refresh_all().await
}

pub async fn get_state(State(monitor): State<Arc<Monitor>>) -> Json<StoreSnapshot> {
    Json(monitor.store().snapshot().await)
}

pub fn create_router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/state", get(get_state))
        .with_state(monitor)
}

pub async fn start_server(port: u16, monitor: Arc<Monitor>) -> Result<()> {
    let app = create_router(monitor);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {port}"))?;
    info!("Status endpoint: http://localhost:{}/api/status", addr.port());
    axum::serve(listener, app).await.context("API server stopped")
}
