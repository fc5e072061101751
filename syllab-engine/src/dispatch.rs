//! In-process worker dispatch
//!
//! One fire-and-forget task per job, deduplicated by job id. The map entry
//! doubles as the cancellation handle: dropping work is signaled through a
//! watch channel the pipeline polls at phase, module and lesson boundaries.

use crate::pipeline::Pipeline;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use syllab_core::EntityId;
use tokio::sync::watch;

#[derive(Clone)]
pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    running: Arc<DashMap<EntityId, watch::Sender<bool>>>,
}

impl Dispatcher {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            running: Arc::new(DashMap::new()),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Spawn a worker for the job unless one is already tracked in this
    /// process. Returns whether a worker was spawned. Cross-process
    /// exclusivity is the claim's job; this only keeps one process from
    /// racing itself.
    pub fn enqueue(&self, job_id: EntityId) -> bool {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        match self.running.entry(job_id) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(cancel_tx);
            }
        }

        let pipeline = self.pipeline.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            pipeline.run(job_id, cancel_rx).await;
            running.remove(&job_id);
        });
        tracing::debug!(job_id = %job_id, "build worker dispatched");
        true
    }

    /// Signal the in-process worker (if any) to stop at its next
    /// cancellation check. Returns whether a worker was signaled.
    pub fn signal_cancel(&self, job_id: EntityId) -> bool {
        match self.running.get(&job_id) {
            Some(sender) => sender.send(true).is_ok(),
            None => false,
        }
    }

    /// Whether a worker for the job is tracked in this process.
    pub fn is_running(&self, job_id: EntityId) -> bool {
        self.running.contains_key(&job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use std::sync::Arc;
    use syllab_core::EngineConfig;
    use syllab_store::{BuildStore, MemoryStore};
    use syllab_test_utils::generators::happy_generators;

    fn dispatcher() -> (Dispatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(store.clone(), happy_generators(), EngineConfig::development());
        (Dispatcher::new(pipeline), store)
    }

    #[tokio::test]
    async fn test_enqueue_deduplicates_per_job() {
        let (dispatcher, store) = dispatcher();
        let (job_id, _) = store
            .create_build(
                uuid::Uuid::now_v7(),
                &syllab_test_utils::profiles::english_profile(),
                2,
            )
            .await
            .unwrap();

        assert!(dispatcher.enqueue(job_id));
        // Second enqueue while the first worker may still be tracked must
        // not spawn. It can legitimately return true if the first worker
        // already finished and removed itself, so only assert the invariant
        // while the entry is held.
        if dispatcher.is_running(job_id) {
            assert!(!dispatcher.enqueue(job_id));
        }
    }

    #[tokio::test]
    async fn test_signal_cancel_without_worker() {
        let (dispatcher, _) = dispatcher();
        assert!(!dispatcher.signal_cancel(uuid::Uuid::now_v7()));
    }
}
