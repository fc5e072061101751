//! Failure-injecting store wrapper
//!
//! Delegates every operation to an inner store, except that lesson listing
//! for one targeted module index fails. That turns exactly one module into a
//! structural failure while the rest of the build proceeds, which is how the
//! partial-failure isolation tests produce a mixed outcome.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use syllab_core::{
    BuildEvent, BuildEventInput, BuildJob, BuildStatus, Checkpoint, CheckpointPatch, EntityId,
    JobPatch, LessonPlan, ProgramBlueprint, ProgramStatus, StoreError, StudentProfile, Timestamp,
};
use syllab_gen::Assessment;
use syllab_store::{
    AssessmentKind, BuildStore, BuildView, ClaimOutcome, LessonArtifacts, LessonRow, ModuleRow,
    RetryReset, ScheduleItemInput, StoreResult,
};

/// Store wrapper that fails `lessons_for_module` for one module index.
pub struct FlakyStore {
    inner: Arc<dyn BuildStore>,
    fail_module_index: i32,
    // Resolved lazily when the pipeline looks the module row up.
    target_module_id: Mutex<Option<EntityId>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn BuildStore>, fail_module_index: i32) -> Self {
        Self {
            inner,
            fail_module_index,
            target_module_id: Mutex::new(None),
        }
    }
}

#[async_trait]
impl BuildStore for FlakyStore {
    async fn create_build(
        &self,
        user_id: EntityId,
        profile: &StudentProfile,
        max_retries: i32,
    ) -> StoreResult<(EntityId, EntityId)> {
        self.inner.create_build(user_id, profile, max_retries).await
    }

    async fn job_get(&self, job_id: EntityId) -> StoreResult<BuildJob> {
        self.inner.job_get(job_id).await
    }

    async fn job_update(&self, job_id: EntityId, patch: &JobPatch) -> StoreResult<()> {
        self.inner.job_update(job_id, patch).await
    }

    async fn try_claim(
        &self,
        job_id: EntityId,
        steal_older_than: Option<Timestamp>,
    ) -> StoreResult<ClaimOutcome> {
        self.inner.try_claim(job_id, steal_older_than).await
    }

    async fn fail_if_heartbeat_older(
        &self,
        job_id: EntityId,
        cutoff: Timestamp,
        error: &str,
    ) -> StoreResult<bool> {
        self.inner.fail_if_heartbeat_older(job_id, cutoff, error).await
    }

    async fn reset_for_retry(&self, job_id: EntityId) -> StoreResult<RetryReset> {
        self.inner.reset_for_retry(job_id).await
    }

    async fn cancel_job(&self, job_id: EntityId) -> StoreResult<bool> {
        self.inner.cancel_job(job_id).await
    }

    async fn get_checkpoint(&self, job_id: EntityId) -> StoreResult<Checkpoint> {
        self.inner.get_checkpoint(job_id).await
    }

    async fn update_checkpoint(
        &self,
        job_id: EntityId,
        patch: &CheckpointPatch,
    ) -> StoreResult<()> {
        self.inner.update_checkpoint(job_id, patch).await
    }

    async fn append_event(&self, job_id: EntityId, input: BuildEventInput) -> StoreResult<i64> {
        self.inner.append_event(job_id, input).await
    }

    async fn events_since(
        &self,
        job_id: EntityId,
        after_index: i64,
    ) -> StoreResult<Vec<BuildEvent>> {
        self.inner.events_since(job_id, after_index).await
    }

    async fn program_set_status(
        &self,
        program_id: EntityId,
        status: ProgramStatus,
    ) -> StoreResult<()> {
        self.inner.program_set_status(program_id, status).await
    }

    async fn persist_blueprint(
        &self,
        job_id: EntityId,
        blueprint: &ProgramBlueprint,
    ) -> StoreResult<()> {
        self.inner.persist_blueprint(job_id, blueprint).await
    }

    async fn module_by_index(
        &self,
        program_id: EntityId,
        index: i32,
    ) -> StoreResult<Option<ModuleRow>> {
        let row = self.inner.module_by_index(program_id, index).await?;
        if index == self.fail_module_index {
            if let Some(row) = &row {
                *self.target_module_id.lock().unwrap() = Some(row.id);
            }
        }
        Ok(row)
    }

    async fn module_set_status(
        &self,
        module_id: EntityId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        self.inner.module_set_status(module_id, status, error).await
    }

    async fn lessons_for_module(&self, module_id: EntityId) -> StoreResult<Vec<LessonRow>> {
        if *self.target_module_id.lock().unwrap() == Some(module_id) {
            return Err(StoreError::TransactionFailed {
                reason: "injected lesson listing failure".to_string(),
            });
        }
        self.inner.lessons_for_module(module_id).await
    }

    async fn upsert_lesson(
        &self,
        module_id: EntityId,
        index: i32,
        plan: &LessonPlan,
    ) -> StoreResult<LessonRow> {
        self.inner.upsert_lesson(module_id, index, plan).await
    }

    async fn lesson_set_status(
        &self,
        lesson_id: EntityId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        self.inner.lesson_set_status(lesson_id, status, error).await
    }

    async fn commit_lesson_artifacts(
        &self,
        lesson_id: EntityId,
        artifacts: &LessonArtifacts,
    ) -> StoreResult<()> {
        self.inner.commit_lesson_artifacts(lesson_id, artifacts).await
    }

    async fn assessment_exists(
        &self,
        program_id: EntityId,
        module_id: Option<EntityId>,
        kind: AssessmentKind,
    ) -> StoreResult<bool> {
        self.inner.assessment_exists(program_id, module_id, kind).await
    }

    async fn create_assessment(
        &self,
        program_id: EntityId,
        module_id: Option<EntityId>,
        kind: AssessmentKind,
        assessment: &Assessment,
    ) -> StoreResult<EntityId> {
        self.inner
            .create_assessment(program_id, module_id, kind, assessment)
            .await
    }

    async fn assessments_for_schedule(
        &self,
        program_id: EntityId,
    ) -> StoreResult<(Vec<EntityId>, Option<EntityId>)> {
        self.inner.assessments_for_schedule(program_id).await
    }

    async fn replace_schedule(
        &self,
        program_id: EntityId,
        start_date: Timestamp,
        items: &[ScheduleItemInput],
    ) -> StoreResult<()> {
        self.inner.replace_schedule(program_id, start_date, items).await
    }

    async fn count_modules(
        &self,
        program_id: EntityId,
        status: BuildStatus,
    ) -> StoreResult<i64> {
        self.inner.count_modules(program_id, status).await
    }

    async fn count_lessons(
        &self,
        program_id: EntityId,
        status: BuildStatus,
    ) -> StoreResult<i64> {
        self.inner.count_lessons(program_id, status).await
    }

    async fn lessons_for_program(
        &self,
        program_id: EntityId,
    ) -> StoreResult<Vec<(i32, LessonRow)>> {
        self.inner.lessons_for_program(program_id).await
    }

    async fn build_view(&self, job_id: EntityId) -> StoreResult<BuildView> {
        self.inner.build_view(job_id).await
    }
}
