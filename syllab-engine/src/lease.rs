//! Job lease management
//!
//! A lease is the job row itself: status RUNNING plus a fresh
//! last_heartbeat_at. Exclusivity comes from the store's atomic conditional
//! claim; this module wraps it with the staleness policy and provides the
//! heartbeat refresher used around long generation calls.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use syllab_core::{
    BuildEventInput, EngineConfig, EntityId, EventLevel, JobPatch, StepStatus, SyllabResult,
};
use syllab_store::{BuildStore, ClaimOutcome};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Claim and staleness policy over a [`BuildStore`].
#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn BuildStore>,
    config: EngineConfig,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn BuildStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Try to take the job lease. With `steal_stale` a RUNNING job whose
    /// heartbeat is older than the configured threshold is treated as
    /// abandoned and claimed over.
    pub async fn claim(&self, job_id: EntityId, steal_stale: bool) -> SyllabResult<ClaimOutcome> {
        let cutoff = steal_stale
            .then(|| Utc::now() - chrono::Duration::from_std(self.config.stale_after).unwrap_or_default());
        Ok(self.store.try_claim(job_id, cutoff).await?)
    }

    /// Force-fail a RUNNING job whose heartbeat is older than the staleness
    /// threshold, appending a recovery event. Returns whether the job was
    /// transitioned.
    pub async fn mark_failed_if_stale(&self, job_id: EntityId) -> SyllabResult<bool> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.stale_after).unwrap_or_default();
        let error = format!(
            "Worker heartbeat stale for over {}s, job presumed abandoned",
            self.config.stale_after.as_secs()
        );
        let failed = self
            .store
            .fail_if_heartbeat_older(job_id, cutoff, &error)
            .await?;

        if failed {
            tracing::warn!(job_id = %job_id, "stale job force-failed");
            self.store
                .append_event(
                    job_id,
                    BuildEventInput::new("job.failed.stale_heartbeat", "Recover", StepStatus::Failed)
                        .with_level(EventLevel::Error)
                        .with_message(error),
                )
                .await?;
        }
        Ok(failed)
    }
}

/// Keeps a job's heartbeat fresh for the lifetime of the guard.
///
/// Spawned around generation calls that can outlast the staleness
/// threshold. The refresher task is aborted on drop; a final heartbeat is
/// not needed because every state-mutating store call touches it anyway.
pub struct HeartbeatGuard {
    handle: JoinHandle<()>,
}

impl HeartbeatGuard {
    pub fn new(store: Arc<dyn BuildStore>, job_id: EntityId, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately, which doubles as the
            // "heartbeat before the call" write.
            loop {
                ticker.tick().await;
                if let Err(e) = store.job_update(job_id, &JobPatch::heartbeat()).await {
                    tracing::debug!(job_id = %job_id, error = %e, "heartbeat refresh failed");
                }
            }
        });
        Self { handle }
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
