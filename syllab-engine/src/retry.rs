//! Retry and recovery controllers
//!
//! Both paths funnel into the store's conditional retry reset, which
//! preserves the checkpoint so the requeued job resumes forward instead of
//! starting over.

use crate::lease::LeaseManager;
use syllab_core::{BuildEventInput, EntityId, JobStatus, StepStatus, StoreError, SyllabResult};
use syllab_store::{checkpoint_payload, BuildStore, RetryReset};

/// Result of a retry request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Job was requeued. `resume_from` is the checkpoint step the next run
    /// will continue after ("start" for a fresh job).
    Queued {
        retry_count: i32,
        resume_from: String,
    },
    NotFound,
    /// Job is not in FAILED state.
    InvalidStatus,
    MaxRetriesReached,
}

/// Result of a recovery request for a presumed-crashed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Job was force-failed and requeued.
    Queued {
        retry_count: i32,
        resume_from: String,
    },
    NotFound,
    /// Recovery only applies to RUNNING jobs.
    NotRunning,
    /// The worker is alive; its heartbeat is within the staleness window.
    HeartbeatFresh,
    MaxRetriesReached,
}

/// Requeue a FAILED job within its retry budget.
pub async fn request_retry(
    store: &dyn BuildStore,
    job_id: EntityId,
) -> SyllabResult<RetryOutcome> {
    let reset = match store.reset_for_retry(job_id).await {
        Ok(reset) => reset,
        Err(StoreError::NotFound { .. }) => return Ok(RetryOutcome::NotFound),
        Err(e) => return Err(e.into()),
    };

    match reset {
        RetryReset::Ok { retry_count } => {
            let checkpoint = store.get_checkpoint(job_id).await?;
            let resume_from = checkpoint.resume_from().to_string();
            tracing::info!(
                job_id = %job_id,
                retry_count,
                resume_from = %resume_from,
                "build job requeued for retry"
            );
            store
                .append_event(
                    job_id,
                    BuildEventInput::new("job.retry.queued", "Retry", StepStatus::InProgress)
                        .with_message(format!(
                            "Build requeued (retry #{retry_count}), resuming from: {resume_from}"
                        ))
                        .with_payload(checkpoint_payload(&checkpoint)),
                )
                .await?;
            Ok(RetryOutcome::Queued {
                retry_count,
                resume_from,
            })
        }
        RetryReset::InvalidStatus => Ok(RetryOutcome::InvalidStatus),
        RetryReset::MaxRetriesReached => Ok(RetryOutcome::MaxRetriesReached),
    }
}

/// Force-fail and requeue a RUNNING job whose worker stopped heartbeating.
pub async fn request_recovery(
    store: &dyn BuildStore,
    lease: &LeaseManager,
    job_id: EntityId,
) -> SyllabResult<RecoveryOutcome> {
    let job = match store.job_get(job_id).await {
        Ok(job) => job,
        Err(StoreError::NotFound { .. }) => return Ok(RecoveryOutcome::NotFound),
        Err(e) => return Err(e.into()),
    };
    if job.status != JobStatus::Running {
        return Ok(RecoveryOutcome::NotRunning);
    }

    if !lease.mark_failed_if_stale(job_id).await? {
        return Ok(RecoveryOutcome::HeartbeatFresh);
    }

    match request_retry(store, job_id).await? {
        RetryOutcome::Queued {
            retry_count,
            resume_from,
        } => Ok(RecoveryOutcome::Queued {
            retry_count,
            resume_from,
        }),
        RetryOutcome::MaxRetriesReached => Ok(RecoveryOutcome::MaxRetriesReached),
        // The job was FAILED by the staleness check above, so the reset
        // cannot see another status; budget exhaustion is the only
        // remaining rejection.
        RetryOutcome::NotFound | RetryOutcome::InvalidStatus => Ok(RecoveryOutcome::NotRunning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use syllab_core::{CheckpointPatch, EngineConfig, JobPatch, StudentProfile};
    use syllab_store::MemoryStore;

    fn profile() -> StudentProfile {
        StudentProfile {
            topic: "Rust".to_string(),
            current_level: "beginner".to_string(),
            goal_level: "advanced".to_string(),
            target_date: "2027-01-01".to_string(),
            hours_per_day: 2.0,
            content_language: "English".to_string(),
            instruction_language: "English".to_string(),
            strict_target_language: false,
        }
    }

    async fn failed_job(store: &MemoryStore, max_retries: i32) -> EntityId {
        let (job_id, _) = store
            .create_build(syllab_core::new_entity_id(), &profile(), max_retries)
            .await
            .unwrap();
        store
            .job_update(
                job_id,
                &JobPatch {
                    status: Some(JobStatus::Failed),
                    ..JobPatch::default()
                },
            )
            .await
            .unwrap();
        job_id
    }

    #[tokio::test]
    async fn test_retry_reports_resume_point_and_logs_event() {
        let store = MemoryStore::new();
        let job_id = failed_job(&store, 2).await;
        store
            .update_checkpoint(job_id, &CheckpointPatch::lesson(1, 2))
            .await
            .unwrap();

        let outcome = request_retry(&store, job_id).await.unwrap();
        assert_eq!(
            outcome,
            RetryOutcome::Queued {
                retry_count: 1,
                resume_from: "module_1_lesson_2".to_string(),
            }
        );

        let events = store.events_since(job_id, 0).await.unwrap();
        let event = events.last().unwrap();
        assert_eq!(event.event_type, "job.retry.queued");
        assert_eq!(event.payload["step_key"], "module_1_lesson_2");
    }

    #[tokio::test]
    async fn test_retry_budget_rejects_third_attempt() {
        let store = MemoryStore::new();
        let job_id = failed_job(&store, 2).await;

        let fail = JobPatch {
            status: Some(JobStatus::Failed),
            ..JobPatch::default()
        };
        assert!(matches!(
            request_retry(&store, job_id).await.unwrap(),
            RetryOutcome::Queued { retry_count: 1, .. }
        ));
        store.job_update(job_id, &fail).await.unwrap();
        assert!(matches!(
            request_retry(&store, job_id).await.unwrap(),
            RetryOutcome::Queued { retry_count: 2, .. }
        ));
        store.job_update(job_id, &fail).await.unwrap();
        assert_eq!(
            request_retry(&store, job_id).await.unwrap(),
            RetryOutcome::MaxRetriesReached
        );
    }

    #[tokio::test]
    async fn test_retry_rejects_non_failed_job() {
        let store = MemoryStore::new();
        let (job_id, _) = store
            .create_build(syllab_core::new_entity_id(), &profile(), 2)
            .await
            .unwrap();
        assert_eq!(
            request_retry(&store, job_id).await.unwrap(),
            RetryOutcome::InvalidStatus
        );
        assert_eq!(
            request_retry(&store, syllab_core::new_entity_id())
                .await
                .unwrap(),
            RetryOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_recovery_requires_running_and_stale() {
        let store = Arc::new(MemoryStore::new());
        let lease = LeaseManager::new(store.clone(), EngineConfig::development());
        let (job_id, _) = store
            .create_build(syllab_core::new_entity_id(), &profile(), 2)
            .await
            .unwrap();

        // Queued job: recovery does not apply.
        assert_eq!(
            request_recovery(store.as_ref(), &lease, job_id)
                .await
                .unwrap(),
            RecoveryOutcome::NotRunning
        );

        store.try_claim(job_id, None).await.unwrap();
        store
            .set_heartbeat(job_id, Utc::now() - chrono::Duration::seconds(60))
            .await;

        let outcome = request_recovery(store.as_ref(), &lease, job_id)
            .await
            .unwrap();
        assert!(matches!(outcome, RecoveryOutcome::Queued { retry_count: 1, .. }));

        let events = store.events_since(job_id, 0).await.unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert!(types.contains(&"job.failed.stale_heartbeat"));
        assert!(types.contains(&"job.retry.queued"));
    }

    #[tokio::test]
    async fn test_recovery_leaves_live_worker_alone() {
        let store = Arc::new(MemoryStore::new());
        // Production threshold: the claim's heartbeat is fresh.
        let lease = LeaseManager::new(store.clone(), EngineConfig::default());
        let (job_id, _) = store
            .create_build(syllab_core::new_entity_id(), &profile(), 2)
            .await
            .unwrap();
        store.try_claim(job_id, None).await.unwrap();

        assert_eq!(
            request_recovery(store.as_ref(), &lease, job_id)
                .await
                .unwrap(),
            RecoveryOutcome::HeartbeatFresh
        );
        assert_eq!(
            store.job_get(job_id).await.unwrap().status,
            JobStatus::Running
        );
    }
}
