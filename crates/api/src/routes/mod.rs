pub mod health;
pub mod separation;

use axum::Router;
use tower_http::services::ServeDir;

use crate::state::AppState;

/// Build the full route tree.
///
/// ```text
/// /health                   liveness + separator probe
///
/// /separate                 submit a separation (multipart)
/// /status/{job_id}          poll a job
/// /models                   list selectable models
///
/// /files/{job_id}/{stem}    published stems (static)
/// ```
pub fn app_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(separation::router())
        .nest_service("/files", ServeDir::new(state.store.root()))
}
