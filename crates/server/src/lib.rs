//! HTTP serving layer for the movie recommender.
//!
//! This crate loads a trained artifact and the processed tables, then serves
//! top-N recommendations over HTTP and keeps a request log for drift
//! monitoring.
//!
//! ## Routes
//! - `GET /` health check
//! - `POST /recommend` top-N unseen movies for a user
//! - `GET /monitoring/drift-report` HTML drift report over logged requests
//! - `GET /monitoring/stats` request counters

pub mod config;
pub mod error;
pub mod monitoring;
pub mod routes;
pub mod state;

pub use config::{ModelKind, ServerConfig};
pub use error::ApiError;
pub use monitoring::{RequestLog, drift_report, ks_2samp};
pub use routes::router;
pub use state::AppState;

use anyhow::{Context, Result};
use tracing::info;

/// Load state and serve until the process is stopped
pub async fn serve(config: ServerConfig) -> Result<()> {
    let state = AppState::load(&config)?;
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    info!(addr = %config.bind, model = %config.model_kind, "Serving recommendations");
    axum::serve(listener, router(state))
        .await
        .context("HTTP server stopped with an error")
}
