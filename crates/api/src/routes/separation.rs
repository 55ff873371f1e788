//! Route definitions for the separation API.
//!
//! Paths are mounted at the root so existing front-ends keep working.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::separation;
use crate::state::AppState;

/// ```text
/// POST   /separate           -> separate_audio
/// GET    /status/{job_id}    -> job_status
/// GET    /models             -> list_models
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/separate", post(separation::separate_audio))
        .route("/status/{job_id}", get(separation::job_status))
        .route("/models", get(separation::list_models))
}
