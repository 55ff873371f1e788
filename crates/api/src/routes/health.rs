use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use stemsplit_core::jobs::JobCounts;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the separator backend could be started.
    pub separator_available: bool,
    /// Jobs currently known, by state.
    pub jobs: JobCounts,
}

/// GET /health -- returns service and separator health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let separator_available = match state.separator.probe().await {
        Ok(version) => {
            tracing::trace!(version = %version, "Separator probe succeeded");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Separator probe failed");
            false
        }
    };

    let status = if separator_available { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        separator_available,
        jobs: state.jobs.counts().await,
    })
}

/// Mount health check routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
