//! Build job REST routes
//!
//! Create, inspect, retry, recover and cancel build jobs, plus the plain
//! JSON event range query reconnecting clients use to catch up.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use syllab_core::{BuildEventInput, BuildJob, EntityId, StepStatus};
use syllab_engine::{request_recovery, request_retry, RecoveryOutcome, RetryOutcome};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{
    AfterIndexQuery, CancelResponse, EventsResponse, GenerateProgramRequest,
    GenerateProgramResponse, RequeueResponse,
};

/// POST /programs/generate - create a program and its build job, then
/// dispatch a worker.
pub async fn generate_program(
    State(state): State<AppState>,
    Json(req): Json<GenerateProgramRequest>,
) -> ApiResult<(StatusCode, Json<GenerateProgramResponse>)> {
    if req.profile.topic.trim().is_empty() {
        return Err(ApiError::missing_field("profile.topic"));
    }
    if req.profile.hours_per_day <= 0.0 {
        return Err(ApiError::invalid_input("hours_per_day must be positive"));
    }

    let (job_id, program_id) = state
        .store
        .create_build(req.user_id, &req.profile, state.engine_config.max_retries)
        .await?;
    state.dispatcher.enqueue(job_id);

    tracing::info!(job_id = %job_id, program_id = %program_id, "build requested");
    Ok((
        StatusCode::CREATED,
        Json(GenerateProgramResponse { job_id, program_id }),
    ))
}

/// GET /jobs/:id - job snapshot.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<EntityId>,
) -> ApiResult<Json<BuildJob>> {
    let job = state.store.job_get(job_id).await?;
    Ok(Json(job))
}

/// GET /jobs/:id/events - ordered event suffix with `index > after_index`.
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<EntityId>,
    Query(query): Query<AfterIndexQuery>,
) -> ApiResult<Json<EventsResponse>> {
    let after_index = query.after_index.unwrap_or(0);
    // Surface a 404 for unknown jobs instead of an empty list.
    state.store.job_get(job_id).await?;
    let events = state.store.events_since(job_id, after_index).await?;
    let last_index = events.last().map_or(after_index, |e| e.index);
    Ok(Json(EventsResponse {
        job_id,
        events,
        last_index,
    }))
}

/// POST /jobs/:id/retry - requeue a failed job within its retry budget.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<EntityId>,
) -> ApiResult<Json<RequeueResponse>> {
    match request_retry(state.store.as_ref(), job_id).await? {
        RetryOutcome::Queued {
            retry_count,
            resume_from,
        } => {
            state.dispatcher.enqueue(job_id);
            Ok(Json(RequeueResponse {
                job_id,
                retry_count,
                resume_from,
            }))
        }
        RetryOutcome::NotFound => Err(ApiError::job_not_found(job_id)),
        RetryOutcome::InvalidStatus => Err(ApiError::state_conflict(
            "Only failed jobs can be retried",
        )),
        RetryOutcome::MaxRetriesReached => Err(ApiError::retry_exhausted(job_id)),
    }
}

/// POST /jobs/:id/recover - force-fail a running job with a stale heartbeat
/// and requeue it.
pub async fn recover_job(
    State(state): State<AppState>,
    Path(job_id): Path<EntityId>,
) -> ApiResult<Json<RequeueResponse>> {
    let lease = state.dispatcher.pipeline().lease();
    match request_recovery(state.store.as_ref(), lease, job_id).await? {
        RecoveryOutcome::Queued {
            retry_count,
            resume_from,
        } => {
            state.dispatcher.enqueue(job_id);
            Ok(Json(RequeueResponse {
                job_id,
                retry_count,
                resume_from,
            }))
        }
        RecoveryOutcome::NotFound => Err(ApiError::job_not_found(job_id)),
        RecoveryOutcome::NotRunning => Err(ApiError::state_conflict(
            "Recovery only applies to running jobs",
        )),
        RecoveryOutcome::HeartbeatFresh => Err(ApiError::state_conflict(
            "Worker heartbeat is fresh; the job is still making progress",
        )),
        RecoveryOutcome::MaxRetriesReached => Err(ApiError::retry_exhausted(job_id)),
    }
}

/// POST /jobs/:id/cancel - flip a queued/running job to Canceled and signal
/// the in-process worker.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<EntityId>,
) -> ApiResult<Json<CancelResponse>> {
    let canceled = state.store.cancel_job(job_id).await?;
    if !canceled {
        // Distinguish unknown jobs from already-terminal ones.
        state.store.job_get(job_id).await?;
        return Err(ApiError::state_conflict("Job is not active"));
    }

    state.dispatcher.signal_cancel(job_id);
    state
        .store
        .append_event(
            job_id,
            BuildEventInput::new("job.canceled", "Cancel", StepStatus::Completed)
                .with_message("Build canceled by request"),
        )
        .await?;

    tracing::info!(job_id = %job_id, "build canceled");
    Ok(Json(CancelResponse {
        job_id,
        status: "CANCELED".to_string(),
    }))
}
