//! Request and response types for the SYLLAB API.

use serde::{Deserialize, Serialize};
use syllab_core::{BuildEvent, EntityId, StudentProfile};

/// POST /programs/generate request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateProgramRequest {
    /// Opaque caller identity; no auth semantics attached.
    pub user_id: EntityId,
    pub profile: StudentProfile,
}

/// POST /programs/generate response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateProgramResponse {
    pub job_id: EntityId,
    pub program_id: EntityId,
}

/// POST /jobs/:id/retry and /jobs/:id/recover response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequeueResponse {
    pub job_id: EntityId,
    pub retry_count: i32,
    /// Checkpoint step the next run resumes after ("start" for fresh jobs).
    pub resume_from: String,
}

/// POST /jobs/:id/cancel response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: EntityId,
    pub status: String,
}

/// GET /jobs/:id/events response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub job_id: EntityId,
    pub events: Vec<BuildEvent>,
    /// Highest index in `events`, or the request cursor when empty; feed it
    /// back as `after_index` to continue the tail.
    pub last_index: i64,
}

/// Cursor query for event range and stream endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AfterIndexQuery {
    pub after_index: Option<i64>,
}
