//! In-memory store implementation
//!
//! Backs the engine and API tests. All state lives behind a single async
//! mutex, so the claim path is atomic by construction, the same guarantee
//! the PostgreSQL implementation gets from its conditional UPDATE.

use crate::{
    AssessmentKind, BuildStore, BuildView, ClaimOutcome, LessonArtifacts, LessonRow, ModuleNode,
    ModuleRow, ProgramRow, RetryReset, ScheduleItemInput, StoreResult,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use syllab_core::{
    new_entity_id, BuildEvent, BuildEventInput, BuildJob, BuildStatus, Checkpoint,
    CheckpointPatch, EntityId, JobPatch, JobStatus, LessonPlan, Phase, ProgramBlueprint,
    ProgramStatus, StoreError, StudentProfile, Timestamp,
};
use syllab_gen::Assessment;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct AssessmentRow {
    id: EntityId,
    program_id: EntityId,
    module_id: Option<EntityId>,
    kind: AssessmentKind,
    assessment: Assessment,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<EntityId, BuildJob>,
    programs: HashMap<EntityId, ProgramRow>,
    modules: HashMap<EntityId, ModuleRow>,
    lessons: HashMap<EntityId, LessonRow>,
    events: HashMap<EntityId, Vec<BuildEvent>>,
    artifacts: HashMap<EntityId, LessonArtifacts>,
    assessments: Vec<AssessmentRow>,
    schedules: HashMap<EntityId, (Timestamp, Vec<ScheduleItemInput>)>,
}

/// In-memory [`BuildStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: rewind a job's heartbeat so staleness paths can be
    /// exercised without waiting.
    pub async fn set_heartbeat(&self, job_id: EntityId, at: Timestamp) {
        let mut inner = self.inner.lock().await;
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.last_heartbeat_at = Some(at);
            job.updated_at = at;
        }
    }

    /// Test hook: stored schedule items for a program.
    pub async fn schedule_items(&self, program_id: EntityId) -> Vec<ScheduleItemInput> {
        let inner = self.inner.lock().await;
        inner
            .schedules
            .get(&program_id)
            .map(|(_, items)| items.clone())
            .unwrap_or_default()
    }

    /// Test hook: committed artifacts of a lesson.
    pub async fn lesson_artifacts(&self, lesson_id: EntityId) -> Option<LessonArtifacts> {
        let inner = self.inner.lock().await;
        inner.artifacts.get(&lesson_id).cloned()
    }

    /// Test hook: number of stored assessments for a program.
    pub async fn assessment_count(&self, program_id: EntityId) -> usize {
        let inner = self.inner.lock().await;
        inner
            .assessments
            .iter()
            .filter(|a| a.program_id == program_id)
            .count()
    }
}

fn job_mut(inner: &mut Inner, job_id: EntityId) -> StoreResult<&mut BuildJob> {
    inner.jobs.get_mut(&job_id).ok_or(StoreError::NotFound {
        entity: "build_job",
        id: job_id,
    })
}

fn job_ref(inner: &Inner, job_id: EntityId) -> StoreResult<&BuildJob> {
    inner.jobs.get(&job_id).ok_or(StoreError::NotFound {
        entity: "build_job",
        id: job_id,
    })
}

fn apply_patch(job: &mut BuildJob, patch: &JobPatch) {
    let now = Utc::now();
    if let Some(status) = patch.status {
        job.status = status;
    }
    if let Some(phase) = patch.current_phase {
        job.current_phase = phase.as_str().to_string();
    }
    if let Some(item) = &patch.current_item {
        job.current_item = item.clone();
    }
    if let Some(v) = patch.total_modules {
        job.total_modules = v;
    }
    if let Some(v) = patch.completed_modules {
        job.completed_modules = v;
    }
    if let Some(v) = patch.total_lessons {
        job.total_lessons = v;
    }
    if let Some(v) = patch.completed_lessons {
        job.completed_lessons = v;
    }
    if let Some(plan) = &patch.plan {
        job.plan = Some(plan.clone());
    }
    if let Some(error) = &patch.error {
        job.error = error.clone();
    }
    if let Some(started_at) = &patch.started_at {
        job.started_at = *started_at;
    }
    if let Some(finished_at) = &patch.finished_at {
        job.finished_at = *finished_at;
    }
    job.last_heartbeat_at = Some(now);
    job.updated_at = now;
}

#[async_trait]
impl BuildStore for MemoryStore {
    async fn create_build(
        &self,
        user_id: EntityId,
        profile: &StudentProfile,
        max_retries: i32,
    ) -> StoreResult<(EntityId, EntityId)> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let program_id = new_entity_id();
        inner.programs.insert(
            program_id,
            ProgramRow {
                id: program_id,
                user_id,
                topic: profile.topic.clone(),
                status: ProgramStatus::Draft,
                updated_at: now,
            },
        );

        let job_id = new_entity_id();
        let profile_json = serde_json::to_value(profile).map_err(|e| StoreError::InsertFailed {
            entity: "build_job",
            reason: e.to_string(),
        })?;
        inner.jobs.insert(
            job_id,
            BuildJob {
                id: job_id,
                user_id,
                program_id,
                status: JobStatus::Queued,
                current_phase: Phase::Queued.as_str().to_string(),
                current_item: None,
                total_modules: 0,
                completed_modules: 0,
                total_lessons: 0,
                completed_lessons: 0,
                retry_count: 0,
                max_retries,
                last_completed_module_index: None,
                last_completed_lesson_index: None,
                last_completed_step_key: None,
                checkpoint_data: None,
                started_at: None,
                last_heartbeat_at: None,
                finished_at: None,
                plan: None,
                input_profile: profile_json,
                last_event_index: 0,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        inner.events.insert(job_id, Vec::new());

        Ok((job_id, program_id))
    }

    async fn job_get(&self, job_id: EntityId) -> StoreResult<BuildJob> {
        let inner = self.inner.lock().await;
        job_ref(&inner, job_id).cloned()
    }

    async fn job_update(&self, job_id: EntityId, patch: &JobPatch) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let job = job_mut(&mut inner, job_id)?;
        apply_patch(job, patch);
        Ok(())
    }

    async fn try_claim(
        &self,
        job_id: EntityId,
        steal_older_than: Option<Timestamp>,
    ) -> StoreResult<ClaimOutcome> {
        let mut inner = self.inner.lock().await;
        let job = job_mut(&mut inner, job_id)?;

        let claimable = match job.status {
            JobStatus::Queued | JobStatus::Failed => true,
            JobStatus::Running => {
                matches!(steal_older_than, Some(cutoff) if job.heartbeat_at() < cutoff)
            }
            JobStatus::Completed | JobStatus::Canceled => {
                return Ok(ClaimOutcome::AlreadyFinished)
            }
        };

        if !claimable {
            return Ok(ClaimOutcome::AlreadyRunning);
        }

        let now = Utc::now();
        job.status = JobStatus::Running;
        job.started_at = job.started_at.or(Some(now));
        job.last_heartbeat_at = Some(now);
        job.error = None;
        job.updated_at = now;
        Ok(ClaimOutcome::Claimed)
    }

    async fn fail_if_heartbeat_older(
        &self,
        job_id: EntityId,
        cutoff: Timestamp,
        error: &str,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let job = job_mut(&mut inner, job_id)?;

        if job.status != JobStatus::Running || job.heartbeat_at() >= cutoff {
            return Ok(false);
        }

        let now = Utc::now();
        job.status = JobStatus::Failed;
        job.current_phase = Phase::Failed.as_str().to_string();
        job.error = Some(error.to_string());
        job.finished_at = Some(now);
        job.last_heartbeat_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }

    async fn reset_for_retry(&self, job_id: EntityId) -> StoreResult<RetryReset> {
        let mut inner = self.inner.lock().await;
        let job = job_mut(&mut inner, job_id)?;

        if job.status != JobStatus::Failed {
            return Ok(RetryReset::InvalidStatus);
        }
        if job.retry_count >= job.max_retries {
            return Ok(RetryReset::MaxRetriesReached);
        }

        // Status and liveness reset; checkpoint fields deliberately kept so
        // the retry resumes forward.
        job.status = JobStatus::Queued;
        job.current_phase = Phase::Queued.as_str().to_string();
        job.current_item = None;
        job.error = None;
        job.started_at = None;
        job.finished_at = None;
        job.last_heartbeat_at = None;
        job.retry_count += 1;
        job.updated_at = Utc::now();
        Ok(RetryReset::Ok {
            retry_count: job.retry_count,
        })
    }

    async fn cancel_job(&self, job_id: EntityId) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let job = job_mut(&mut inner, job_id)?;

        if job.status.is_terminal() {
            return Ok(false);
        }

        let now = Utc::now();
        job.status = JobStatus::Canceled;
        job.finished_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }

    async fn get_checkpoint(&self, job_id: EntityId) -> StoreResult<Checkpoint> {
        let inner = self.inner.lock().await;
        Ok(job_ref(&inner, job_id)?.checkpoint())
    }

    async fn update_checkpoint(
        &self,
        job_id: EntityId,
        patch: &CheckpointPatch,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let job = job_mut(&mut inner, job_id)?;
        let now = Utc::now();

        if let Some(module_index) = patch.module_index {
            job.last_completed_module_index = Some(module_index);
        }
        if let Some(lesson_index) = patch.lesson_index {
            job.last_completed_lesson_index = Some(lesson_index);
        }
        if let Some(step_key) = &patch.step_key {
            job.last_completed_step_key = Some(step_key.clone());
        }
        if let Some(data) = &patch.data {
            job.checkpoint_data = Some(data.clone());
        }
        job.last_heartbeat_at = Some(now);
        job.updated_at = now;
        Ok(())
    }

    async fn append_event(&self, job_id: EntityId, input: BuildEventInput) -> StoreResult<i64> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let index = {
            let job = job_mut(&mut inner, job_id)?;
            job.last_event_index += 1;
            job.last_heartbeat_at = Some(now);
            job.updated_at = now;
            job.last_event_index
        };

        inner.events.entry(job_id).or_default().push(BuildEvent {
            job_id,
            index,
            event_type: input.event_type,
            step: input.step,
            status: input.status,
            level: input.level,
            message: input.message,
            payload: input.payload,
            created_at: now,
        });

        Ok(index)
    }

    async fn events_since(
        &self,
        job_id: EntityId,
        after_index: i64,
    ) -> StoreResult<Vec<BuildEvent>> {
        let inner = self.inner.lock().await;
        // Verify the job exists so unknown ids surface as NotFound rather
        // than an empty feed.
        job_ref(&inner, job_id)?;
        Ok(inner
            .events
            .get(&job_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.index > after_index)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn program_set_status(
        &self,
        program_id: EntityId,
        status: ProgramStatus,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let program = inner
            .programs
            .get_mut(&program_id)
            .ok_or(StoreError::NotFound {
                entity: "program",
                id: program_id,
            })?;
        program.status = status;
        program.updated_at = Utc::now();
        Ok(())
    }

    async fn persist_blueprint(
        &self,
        job_id: EntityId,
        blueprint: &ProgramBlueprint,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let (program_id, plan_json) = {
            let job = job_ref(&inner, job_id)?;
            let plan = serde_json::to_value(blueprint).map_err(|e| StoreError::UpdateFailed {
                entity: "build_job",
                id: job_id,
                reason: e.to_string(),
            })?;
            (job.program_id, plan)
        };

        inner.modules.retain(|_, m| m.program_id != program_id);

        for module in &blueprint.modules {
            let id = new_entity_id();
            inner.modules.insert(
                id,
                ModuleRow {
                    id,
                    program_id,
                    index: module.index,
                    title: module.title.clone(),
                    outcomes: module.outcomes.clone(),
                    build_status: BuildStatus::Pending,
                    build_error: None,
                },
            );
        }

        let total_lessons: i32 = blueprint.modules.iter().map(|m| m.lessons_count).sum();
        let job = job_mut(&mut inner, job_id)?;
        let now = Utc::now();
        job.plan = Some(plan_json);
        job.total_modules = blueprint.modules.len() as i32;
        job.completed_modules = 0;
        job.total_lessons = total_lessons;
        job.completed_lessons = 0;
        job.last_heartbeat_at = Some(now);
        job.updated_at = now;
        Ok(())
    }

    async fn module_by_index(
        &self,
        program_id: EntityId,
        index: i32,
    ) -> StoreResult<Option<ModuleRow>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .modules
            .values()
            .find(|m| m.program_id == program_id && m.index == index)
            .cloned())
    }

    async fn module_set_status(
        &self,
        module_id: EntityId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let module = inner
            .modules
            .get_mut(&module_id)
            .ok_or(StoreError::NotFound {
                entity: "module",
                id: module_id,
            })?;
        module.build_status = status;
        module.build_error = error.map(str::to_string);
        Ok(())
    }

    async fn lessons_for_module(&self, module_id: EntityId) -> StoreResult<Vec<LessonRow>> {
        let inner = self.inner.lock().await;
        let mut lessons: Vec<LessonRow> = inner
            .lessons
            .values()
            .filter(|l| l.module_id == module_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| l.index);
        Ok(lessons)
    }

    async fn upsert_lesson(
        &self,
        module_id: EntityId,
        index: i32,
        plan: &LessonPlan,
    ) -> StoreResult<LessonRow> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner
            .lessons
            .values_mut()
            .find(|l| l.module_id == module_id && l.index == index)
        {
            existing.title = plan.title.clone();
            existing.objectives = plan.objectives.clone();
            existing.estimated_minutes = plan.estimated_minutes;
            return Ok(existing.clone());
        }

        let id = new_entity_id();
        let row = LessonRow {
            id,
            module_id,
            index,
            title: plan.title.clone(),
            objectives: plan.objectives.clone(),
            estimated_minutes: plan.estimated_minutes,
            build_status: BuildStatus::Pending,
            build_error: None,
        };
        inner.lessons.insert(id, row.clone());
        Ok(row)
    }

    async fn lesson_set_status(
        &self,
        lesson_id: EntityId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let lesson = inner
            .lessons
            .get_mut(&lesson_id)
            .ok_or(StoreError::NotFound {
                entity: "lesson",
                id: lesson_id,
            })?;
        lesson.build_status = status;
        lesson.build_error = error.map(str::to_string);
        Ok(())
    }

    async fn commit_lesson_artifacts(
        &self,
        lesson_id: EntityId,
        artifacts: &LessonArtifacts,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let lesson = inner
            .lessons
            .get_mut(&lesson_id)
            .ok_or(StoreError::NotFound {
                entity: "lesson",
                id: lesson_id,
            })?;
        lesson.build_status = BuildStatus::Completed;
        lesson.build_error = None;
        inner.artifacts.insert(lesson_id, artifacts.clone());
        Ok(())
    }

    async fn assessment_exists(
        &self,
        program_id: EntityId,
        module_id: Option<EntityId>,
        kind: AssessmentKind,
    ) -> StoreResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner
            .assessments
            .iter()
            .any(|a| a.program_id == program_id && a.module_id == module_id && a.kind == kind))
    }

    async fn create_assessment(
        &self,
        program_id: EntityId,
        module_id: Option<EntityId>,
        kind: AssessmentKind,
        assessment: &Assessment,
    ) -> StoreResult<EntityId> {
        let mut inner = self.inner.lock().await;
        let id = new_entity_id();
        inner.assessments.push(AssessmentRow {
            id,
            program_id,
            module_id,
            kind,
            assessment: assessment.clone(),
        });
        Ok(id)
    }

    async fn assessments_for_schedule(
        &self,
        program_id: EntityId,
    ) -> StoreResult<(Vec<EntityId>, Option<EntityId>)> {
        let inner = self.inner.lock().await;

        let mut quizzes: Vec<(i32, EntityId)> = inner
            .assessments
            .iter()
            .filter(|a| a.program_id == program_id && a.kind == AssessmentKind::Quiz)
            .filter_map(|a| {
                let module_id = a.module_id?;
                let module = inner.modules.get(&module_id)?;
                Some((module.index, a.id))
            })
            .collect();
        quizzes.sort_by_key(|(index, _)| *index);

        let exam = inner
            .assessments
            .iter()
            .find(|a| {
                a.program_id == program_id
                    && a.module_id.is_none()
                    && a.kind == AssessmentKind::Exam
            })
            .map(|a| a.id);

        Ok((quizzes.into_iter().map(|(_, id)| id).collect(), exam))
    }

    async fn replace_schedule(
        &self,
        program_id: EntityId,
        start_date: Timestamp,
        items: &[ScheduleItemInput],
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .schedules
            .insert(program_id, (start_date, items.to_vec()));
        Ok(())
    }

    async fn count_modules(
        &self,
        program_id: EntityId,
        status: BuildStatus,
    ) -> StoreResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .modules
            .values()
            .filter(|m| m.program_id == program_id && m.build_status == status)
            .count() as i64)
    }

    async fn count_lessons(
        &self,
        program_id: EntityId,
        status: BuildStatus,
    ) -> StoreResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .lessons
            .values()
            .filter(|l| {
                inner
                    .modules
                    .get(&l.module_id)
                    .is_some_and(|m| m.program_id == program_id)
                    && l.build_status == status
            })
            .count() as i64)
    }

    async fn lessons_for_program(
        &self,
        program_id: EntityId,
    ) -> StoreResult<Vec<(i32, LessonRow)>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<(i32, LessonRow)> = inner
            .lessons
            .values()
            .filter_map(|l| {
                let module = inner.modules.get(&l.module_id)?;
                (module.program_id == program_id).then(|| (module.index, l.clone()))
            })
            .collect();
        rows.sort_by_key(|(module_index, lesson)| (*module_index, lesson.index));
        Ok(rows)
    }

    async fn build_view(&self, job_id: EntityId) -> StoreResult<BuildView> {
        let inner = self.inner.lock().await;
        let job = job_ref(&inner, job_id)?.clone();
        let program = inner
            .programs
            .get(&job.program_id)
            .ok_or(StoreError::NotFound {
                entity: "program",
                id: job.program_id,
            })?
            .clone();

        let mut modules: Vec<ModuleRow> = inner
            .modules
            .values()
            .filter(|m| m.program_id == program.id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| m.index);

        let modules = modules
            .into_iter()
            .map(|module| {
                let mut lessons: Vec<LessonRow> = inner
                    .lessons
                    .values()
                    .filter(|l| l.module_id == module.id)
                    .cloned()
                    .collect();
                lessons.sort_by_key(|l| l.index);
                ModuleNode { module, lessons }
            })
            .collect();

        Ok(BuildView {
            job,
            program,
            modules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syllab_core::StepStatus;

    fn profile() -> StudentProfile {
        StudentProfile {
            topic: "Rust".to_string(),
            current_level: "beginner".to_string(),
            goal_level: "intermediate".to_string(),
            target_date: "2027-01-01".to_string(),
            hours_per_day: 2.0,
            content_language: "English".to_string(),
            instruction_language: "English".to_string(),
            strict_target_language: true,
        }
    }

    #[tokio::test]
    async fn test_create_build_starts_queued() {
        let store = MemoryStore::new();
        let (job_id, program_id) = store
            .create_build(new_entity_id(), &profile(), 2)
            .await
            .unwrap();

        let job = store.job_get(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.program_id, program_id);
        assert_eq!(job.max_retries, 2);
        assert_eq!(job.last_event_index, 0);
        assert!(job.checkpoint().is_fresh());
    }

    #[tokio::test]
    async fn test_empty_patch_refreshes_heartbeat() {
        let store = MemoryStore::new();
        let (job_id, _) = store
            .create_build(new_entity_id(), &profile(), 2)
            .await
            .unwrap();
        let stale = Utc::now() - chrono::Duration::seconds(600);
        store.set_heartbeat(job_id, stale).await;

        store
            .job_update(job_id, &JobPatch::heartbeat())
            .await
            .unwrap();

        let job = store.job_get(job_id).await.unwrap();
        assert!(job.last_heartbeat_at.unwrap() > stale);
        // No other field moved.
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.error, None);
    }

    #[tokio::test]
    async fn test_event_indexes_are_gapless_from_one() {
        let store = MemoryStore::new();
        let (job_id, _) = store
            .create_build(new_entity_id(), &profile(), 2)
            .await
            .unwrap();

        for i in 0..5 {
            let index = store
                .append_event(
                    job_id,
                    BuildEventInput::new(format!("step.{i}"), "Step", StepStatus::Completed),
                )
                .await
                .unwrap();
            assert_eq!(index, i + 1);
        }

        let events = store.events_since(job_id, 2).await.unwrap();
        let indexes: Vec<i64> = events.iter().map(|e| e.index).collect();
        assert_eq!(indexes, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_claim_transitions_and_finished_jobs() {
        let store = MemoryStore::new();
        let (job_id, _) = store
            .create_build(new_entity_id(), &profile(), 2)
            .await
            .unwrap();

        assert_eq!(
            store.try_claim(job_id, None).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            store.try_claim(job_id, None).await.unwrap(),
            ClaimOutcome::AlreadyRunning
        );

        store
            .job_update(
                job_id,
                &JobPatch {
                    status: Some(JobStatus::Completed),
                    ..JobPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            store.try_claim(job_id, None).await.unwrap(),
            ClaimOutcome::AlreadyFinished
        );
    }

    #[tokio::test]
    async fn test_claim_steals_stale_lease() {
        let store = MemoryStore::new();
        let (job_id, _) = store
            .create_build(new_entity_id(), &profile(), 2)
            .await
            .unwrap();
        store.try_claim(job_id, None).await.unwrap();

        let stale = Utc::now() - chrono::Duration::seconds(600);
        store.set_heartbeat(job_id, stale).await;

        let cutoff = Utc::now() - chrono::Duration::seconds(180);
        assert_eq!(
            store.try_claim(job_id, Some(cutoff)).await.unwrap(),
            ClaimOutcome::Claimed
        );
    }

    #[tokio::test]
    async fn test_reset_for_retry_preserves_checkpoint() {
        let store = MemoryStore::new();
        let (job_id, _) = store
            .create_build(new_entity_id(), &profile(), 2)
            .await
            .unwrap();

        store
            .update_checkpoint(job_id, &CheckpointPatch::lesson(1, 3))
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

        let reset = store.reset_for_retry(job_id).await.unwrap();
        assert_eq!(reset, RetryReset::Ok { retry_count: 1 });

        let job = store.job_get(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.started_at.is_none());
        assert!(job.error.is_none());
        let checkpoint = job.checkpoint();
        assert_eq!(checkpoint.module_index, Some(1));
        assert_eq!(checkpoint.lesson_index, Some(3));
        assert_eq!(checkpoint.step_key.as_deref(), Some("module_1_lesson_3"));
    }

    #[tokio::test]
    async fn test_retry_budget_enforced() {
        let store = MemoryStore::new();
        let (job_id, _) = store
            .create_build(new_entity_id(), &profile(), 1)
            .await
            .unwrap();

        let fail = JobPatch {
            status: Some(JobStatus::Failed),
            ..JobPatch::default()
        };

        store.job_update(job_id, &fail).await.unwrap();
        assert_eq!(
            store.reset_for_retry(job_id).await.unwrap(),
            RetryReset::Ok { retry_count: 1 }
        );

        store.job_update(job_id, &fail).await.unwrap();
        assert_eq!(
            store.reset_for_retry(job_id).await.unwrap(),
            RetryReset::MaxRetriesReached
        );
    }

    #[tokio::test]
    async fn test_reset_for_retry_requires_failed_status() {
        let store = MemoryStore::new();
        let (job_id, _) = store
            .create_build(new_entity_id(), &profile(), 2)
            .await
            .unwrap();
        assert_eq!(
            store.reset_for_retry(job_id).await.unwrap(),
            RetryReset::InvalidStatus
        );
    }

    #[tokio::test]
    async fn test_fail_if_heartbeat_older() {
        let store = MemoryStore::new();
        let (job_id, _) = store
            .create_build(new_entity_id(), &profile(), 2)
            .await
            .unwrap();
        store.try_claim(job_id, None).await.unwrap();

        // Fresh heartbeat: no transition.
        let cutoff = Utc::now() - chrono::Duration::seconds(180);
        assert!(!store
            .fail_if_heartbeat_older(job_id, cutoff, "stale")
            .await
            .unwrap());

        store
            .set_heartbeat(job_id, Utc::now() - chrono::Duration::seconds(600))
            .await;
        assert!(store
            .fail_if_heartbeat_older(job_id, cutoff, "stale")
            .await
            .unwrap());

        let job = store.job_get(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("stale"));
    }

    #[tokio::test]
    async fn test_cancel_job_only_while_active() {
        let store = MemoryStore::new();
        let (job_id, _) = store
            .create_build(new_entity_id(), &profile(), 2)
            .await
            .unwrap();

        assert!(store.cancel_job(job_id).await.unwrap());
        let job = store.job_get(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Canceled);

        assert!(!store.cancel_job(job_id).await.unwrap());
    }
}
