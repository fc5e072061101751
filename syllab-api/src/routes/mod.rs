//! REST API routes
//!
//! - Build lifecycle: create, snapshot, retry, recover, cancel
//! - Event log range query and SSE stream
//! - Health check
//!
//! CORS is wide open: the API carries no credentials and the user id is an
//! opaque request value.

pub mod health;
pub mod jobs;
pub mod stream;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the full API router.
pub fn create_api_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/programs/generate", post(jobs::generate_program))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/events", get(jobs::job_events))
        .route("/jobs/:id/retry", post(jobs::retry_job))
        .route("/jobs/:id/recover", post(jobs::recover_job))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/jobs/:id/stream", get(stream::stream_job))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
