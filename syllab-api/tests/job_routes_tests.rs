//! Route handler tests over an in-memory store.
//!
//! These exercise the handlers directly with extractor values, so the
//! assertions see typed responses instead of serialized bodies.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use syllab_api::routes::jobs;
use syllab_api::types::{AfterIndexQuery, GenerateProgramRequest};
use syllab_api::{ApiConfig, AppState, ErrorCode};
use syllab_core::{new_entity_id, EngineConfig, EntityId, JobStatus};
use syllab_gen::GeneratorSet;
use syllab_store::{BuildStore, MemoryStore};
use syllab_test_utils::{english_profile, generators_with_failing_planner, happy_generators};

fn test_state(generators: GeneratorSet) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(
        store.clone() as Arc<dyn BuildStore>,
        generators,
        EngineConfig::development(),
        ApiConfig::default(),
    );
    (state, store)
}

async fn wait_terminal(store: &MemoryStore, job_id: EntityId) -> JobStatus {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let job = store.job_get(job_id).await.unwrap();
            match job.status {
                JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled => {
                    return job.status
                }
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
    })
    .await
    .expect("job did not reach a terminal status")
}

#[tokio::test]
async fn test_generate_program_runs_to_completion() {
    let (state, store) = test_state(happy_generators());

    let (status, Json(created)) = jobs::generate_program(
        State(state.clone()),
        Json(GenerateProgramRequest {
            user_id: new_entity_id(),
            profile: english_profile(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(
        wait_terminal(&store, created.job_id).await,
        JobStatus::Completed
    );

    let Json(job) = jobs::get_job(State(state.clone()), Path(created.job_id))
        .await
        .unwrap();
    assert_eq!(job.program_id, created.program_id);
    assert_eq!(job.retry_count, 0);

    let Json(response) = jobs::job_events(
        State(state),
        Path(created.job_id),
        Query(AfterIndexQuery::default()),
    )
    .await
    .unwrap();
    assert!(!response.events.is_empty());
    for (position, event) in response.events.iter().enumerate() {
        assert_eq!(event.index, position as i64 + 1);
    }
    assert_eq!(
        response.events.last().unwrap().event_type,
        "job.completed"
    );
    assert_eq!(
        response.last_index,
        response.events.last().unwrap().index
    );
}

#[tokio::test]
async fn test_events_cursor_returns_suffix_only() {
    let (state, store) = test_state(happy_generators());

    let (_, Json(created)) = jobs::generate_program(
        State(state.clone()),
        Json(GenerateProgramRequest {
            user_id: new_entity_id(),
            profile: english_profile(),
        }),
    )
    .await
    .unwrap();
    wait_terminal(&store, created.job_id).await;

    let Json(full) = jobs::job_events(
        State(state.clone()),
        Path(created.job_id),
        Query(AfterIndexQuery::default()),
    )
    .await
    .unwrap();
    let cursor = full.events[full.events.len() / 2].index;

    let Json(tail) = jobs::job_events(
        State(state),
        Path(created.job_id),
        Query(AfterIndexQuery {
            after_index: Some(cursor),
        }),
    )
    .await
    .unwrap();
    assert_eq!(tail.events.len(), full.events.len() - cursor as usize);
    assert!(tail.events.iter().all(|e| e.index > cursor));
}

#[tokio::test]
async fn test_generate_program_validates_profile() {
    let (state, _) = test_state(happy_generators());

    let mut blank_topic = english_profile();
    blank_topic.topic = "   ".to_string();
    let err = jobs::generate_program(
        State(state.clone()),
        Json(GenerateProgramRequest {
            user_id: new_entity_id(),
            profile: blank_topic,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingField);

    let mut no_time = english_profile();
    no_time.hours_per_day = 0.0;
    let err = jobs::generate_program(
        State(state),
        Json(GenerateProgramRequest {
            user_id: new_entity_id(),
            profile: no_time,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
}

#[tokio::test]
async fn test_events_for_unknown_job_is_not_found() {
    let (state, _) = test_state(happy_generators());
    let err = jobs::job_events(
        State(state),
        Path(new_entity_id()),
        Query(AfterIndexQuery::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::EntityNotFound);
}

#[tokio::test]
async fn test_retry_requeues_failed_job() {
    let (state, store) = test_state(generators_with_failing_planner());

    let (_, Json(created)) = jobs::generate_program(
        State(state.clone()),
        Json(GenerateProgramRequest {
            user_id: new_entity_id(),
            profile: english_profile(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(
        wait_terminal(&store, created.job_id).await,
        JobStatus::Failed
    );

    let Json(requeued) = jobs::retry_job(State(state.clone()), Path(created.job_id))
        .await
        .unwrap();
    assert_eq!(requeued.retry_count, 1);

    // The retry runs against the same broken planner and fails again.
    assert_eq!(
        wait_terminal(&store, created.job_id).await,
        JobStatus::Failed
    );
    assert_eq!(
        store.job_get(created.job_id).await.unwrap().retry_count,
        1
    );
}

#[tokio::test]
async fn test_retry_conflicts_for_active_job() {
    let (state, store) = test_state(happy_generators());
    let (job_id, _) = store
        .create_build(new_entity_id(), &english_profile(), 2)
        .await
        .unwrap();

    // Still QUEUED: nothing to retry.
    let err = jobs::retry_job(State(state.clone()), Path(job_id))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::StateConflict);

    let err = jobs::retry_job(State(state), Path(new_entity_id()))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::EntityNotFound);
}

#[tokio::test]
async fn test_recover_conflicts_unless_running_and_stale() {
    let (state, store) = test_state(happy_generators());
    let (job_id, _) = store
        .create_build(new_entity_id(), &english_profile(), 2)
        .await
        .unwrap();

    let err = jobs::recover_job(State(state.clone()), Path(job_id))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::StateConflict);

    store.try_claim(job_id, None).await.unwrap();
    store
        .set_heartbeat(job_id, chrono::Utc::now() - chrono::Duration::seconds(60))
        .await;

    let Json(requeued) = jobs::recover_job(State(state), Path(job_id))
        .await
        .unwrap();
    assert_eq!(requeued.retry_count, 1);
    // The requeued job was re-dispatched and runs to completion.
    assert_eq!(wait_terminal(&store, job_id).await, JobStatus::Completed);
}

#[tokio::test]
async fn test_cancel_flips_queued_job_and_rejects_repeats() {
    let (state, store) = test_state(happy_generators());
    let (job_id, _) = store
        .create_build(new_entity_id(), &english_profile(), 2)
        .await
        .unwrap();

    let Json(response) = jobs::cancel_job(State(state.clone()), Path(job_id))
        .await
        .unwrap();
    assert_eq!(response.status, "CANCELED");
    assert_eq!(
        store.job_get(job_id).await.unwrap().status,
        JobStatus::Canceled
    );
    let events = store.events_since(job_id, 0).await.unwrap();
    assert_eq!(events.last().unwrap().event_type, "job.canceled");

    // Already terminal.
    let err = jobs::cancel_job(State(state.clone()), Path(job_id))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::StateConflict);

    let err = jobs::cancel_job(State(state), Path(new_entity_id()))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::EntityNotFound);
}
