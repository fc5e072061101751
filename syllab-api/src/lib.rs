//! SYLLAB API - HTTP Layer
//!
//! Axum REST surface over the build engine: program build requests, job
//! lifecycle operations (retry, recover, cancel), the plain event range
//! query, and the reconnect-safe SSE progress stream.

pub mod config;
pub mod error;
pub mod providers;
pub mod routes;
pub mod state;
pub mod types;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use providers::unconfigured_generators;
pub use routes::create_api_router;
pub use state::AppState;
