//! HTTP transport.
//!
//! Routes:
//! - `POST /api/requirements/extract` streams one run as Server-Sent Events
//! - `GET /api/projects/:project_id/requirements` lists persisted requirements
//! - `GET /health`
//!
//! Closing the event stream cancels the run behind it.

pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::adapters::{DocumentStore, RequirementStore};
use crate::core::Orchestrator;

pub use error::ApiError;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<dyn DocumentStore>,
    pub requirements: Arc<dyn RequirementStore>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/requirements/extract", post(handlers::extract))
        .route(
            "/api/projects/:project_id/requirements",
            get(handlers::list_requirements),
        )
        .with_state(state)
}

/// Bind `address` and serve until Ctrl-C.
pub async fn serve(address: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!(%address, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")
}
