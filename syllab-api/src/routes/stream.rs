//! Reconnect-safe SSE build stream
//!
//! Replays the strict event suffix after the client's cursor, then tails
//! the log by polling. Client contract:
//!
//! - `status`   job snapshot, sent on connect and whenever the job row
//!              changed since the last poll
//! - `progress` one log event, in index order, gapless
//! - `partial`  program/module/lesson tree, resent after structural events
//! - `complete` final job snapshot on success
//! - `error`    terminal error payload on failure or cancellation
//! - `done`     stream end marker, always the last event
//!
//! Reconnecting with `after_index` set to the last seen `progress` index
//! never loses or duplicates events.

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use syllab_core::{EntityId, JobStatus};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::AfterIndexQuery;

/// Whether an event changes the program tree a `partial` frame mirrors.
fn is_structural(event_type: &str) -> bool {
    event_type.starts_with("module.")
        || event_type.starts_with("lesson.")
        || event_type.starts_with("phase.")
}

fn json_event(name: &'static str, data: &impl serde::Serialize) -> Event {
    match Event::default().event(name).json_data(data) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, event = name, "could not serialize stream event");
            Event::default().event("error").data("serialization failure")
        }
    }
}

/// GET /jobs/:id/stream - SSE build progress.
pub async fn stream_job(
    State(state): State<AppState>,
    Path(job_id): Path<EntityId>,
    Query(query): Query<AfterIndexQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // 404 before the stream starts; errors inside it become `error` frames.
    let job = state.store.job_get(job_id).await?;

    // A client watching a job that lost its worker gets it restarted; the
    // atomic claim makes a spurious dispatch harmless.
    if matches!(job.status, JobStatus::Queued | JobStatus::Running) {
        state.dispatcher.enqueue(job_id);
    }

    let poll_interval = state.api_config.stream_poll_interval;
    let mut cursor = query.after_index.unwrap_or(0);

    let stream = async_stream::stream! {
        yield Ok(json_event("status", &job));
        let mut last_updated = job.updated_at;

        loop {
            let events = match state.store.events_since(job_id, cursor).await {
                Ok(events) => events,
                Err(e) => {
                    yield Ok(json_event("error", &json!({ "error": e.to_string() })));
                    yield Ok(Event::default().event("done").data("done"));
                    return;
                }
            };

            let mut tree_changed = false;
            for event in events {
                cursor = event.index;
                tree_changed |= is_structural(&event.event_type);
                yield Ok(json_event("progress", &event));
            }

            if tree_changed {
                if let Ok(view) = state.store.build_view(job_id).await {
                    yield Ok(json_event("partial", &json!({
                        "job": view.job,
                        "program": {
                            "id": view.program.id,
                            "topic": view.program.topic,
                            "status": view.program.status,
                        },
                        "modules": view.modules.iter().map(|node| json!({
                            "id": node.module.id,
                            "index": node.module.index,
                            "title": node.module.title,
                            "build_status": node.module.build_status,
                            "lessons": node.lessons.iter().map(|lesson| json!({
                                "id": lesson.id,
                                "index": lesson.index,
                                "title": lesson.title,
                                "build_status": lesson.build_status,
                            })).collect::<Vec<_>>(),
                        })).collect::<Vec<_>>(),
                    })));
                }
            }

            let job = match state.store.job_get(job_id).await {
                Ok(job) => job,
                Err(e) => {
                    yield Ok(json_event("error", &json!({ "error": e.to_string() })));
                    yield Ok(Event::default().event("done").data("done"));
                    return;
                }
            };

            if job.updated_at != last_updated {
                last_updated = job.updated_at;
                yield Ok(json_event("status", &job));
            }

            match job.status {
                JobStatus::Completed => {
                    // The terminal event lands after the status flip; drain
                    // the tail before closing.
                    if let Ok(events) = state.store.events_since(job_id, cursor).await {
                        for event in events {
                            cursor = event.index;
                            yield Ok(json_event("progress", &event));
                        }
                    }
                    yield Ok(json_event("complete", &job));
                    yield Ok(Event::default().event("done").data("done"));
                    return;
                }
                JobStatus::Failed | JobStatus::Canceled => {
                    if let Ok(events) = state.store.events_since(job_id, cursor).await {
                        for event in events {
                            cursor = event.index;
                            yield Ok(json_event("progress", &event));
                        }
                    }
                    yield Ok(json_event("error", &json!({
                        "status": job.status,
                        "error": job.error,
                        "retry_count": job.retry_count,
                        "max_retries": job.max_retries,
                    })));
                    yield Ok(Event::default().event("done").data("done"));
                    return;
                }
                JobStatus::Queued | JobStatus::Running => {
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
