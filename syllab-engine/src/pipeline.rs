//! Phase pipeline controller
//!
//! Drives one claimed job through plan -> modules -> assessments ->
//! schedule -> completed. Resume is double-guarded: the checkpoint decides
//! where iteration starts, and per-entity build status short-circuits
//! anything already committed. Generation failures degrade to deterministic
//! fallbacks at lesson/assessment granularity; a module-structural error
//! fails only that module; anything escaping this module fails the job.

use crate::fallback;
use crate::lease::{HeartbeatGuard, LeaseManager};
use crate::scheduler::{self, LessonSlot};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use syllab_core::{
    BuildEventInput, BuildStatus, Checkpoint, CheckpointPatch, EngineConfig, EngineError, EntityId,
    EventLevel, JobPatch, JobStatus, LanguagePolicy, LessonPlan, ModuleBlueprint, Phase,
    ProgramBlueprint, ProgramStatus, StepStatus, StudentProfile, SyllabError, SyllabResult,
    MAX_LESSONS_PER_MODULE,
};
use syllab_gen::{Assessment, ExerciseSet, GeneratorSet, LessonNotes, ResourceCandidate};
use syllab_store::{
    AssessmentKind, BuildStore, ClaimOutcome, LessonArtifacts, LessonRow, ModuleRow,
};
use tokio::sync::watch;

const QUIZ_QUESTION_COUNT: usize = 10;
const EXAM_QUESTION_COUNT: usize = 40;

fn module_step(index: i32) -> String {
    format!("Module {}", index + 1)
}

fn lesson_step(module_index: i32, lesson_index: i32) -> String {
    format!("Module {} / Lesson {}", module_index + 1, lesson_index + 1)
}

/// The build worker for one job.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn BuildStore>,
    generators: GeneratorSet,
    config: EngineConfig,
    lease: LeaseManager,
}

impl Pipeline {
    pub fn new(store: Arc<dyn BuildStore>, generators: GeneratorSet, config: EngineConfig) -> Self {
        let lease = LeaseManager::new(store.clone(), config.clone());
        Self {
            store,
            generators,
            config,
            lease,
        }
    }

    pub fn store(&self) -> &Arc<dyn BuildStore> {
        &self.store
    }

    pub fn lease(&self) -> &LeaseManager {
        &self.lease
    }

    /// Claim and run the job to a terminal state. Never panics or returns
    /// an error; failures end up on the job row and in the event log.
    pub async fn run(&self, job_id: EntityId, cancel: watch::Receiver<bool>) {
        match self.lease.claim(job_id, false).await {
            Ok(ClaimOutcome::Claimed) => {}
            Ok(ClaimOutcome::AlreadyRunning) => {
                // Either a live worker holds the lease or its owner died;
                // the staleness check settles which.
                if let Err(e) = self.lease.mark_failed_if_stale(job_id).await {
                    tracing::warn!(job_id = %job_id, error = %e, "staleness check failed");
                }
                return;
            }
            Ok(ClaimOutcome::AlreadyFinished) => {
                tracing::debug!(job_id = %job_id, "job already finished, nothing to do");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "claim failed");
                return;
            }
        }

        if let Err(e) = self.execute(job_id, cancel).await {
            match e {
                SyllabError::Engine(EngineError::Canceled) => {
                    tracing::info!(job_id = %job_id, "build canceled, worker stopped");
                }
                e => self.fail_job(job_id, &e.to_string()).await,
            }
        }
    }

    async fn fail_job(&self, job_id: EntityId, message: &str) {
        tracing::error!(job_id = %job_id, error = %message, "build job failed");
        let patch = JobPatch {
            status: Some(JobStatus::Failed),
            current_phase: Some(Phase::Failed),
            error: Some(Some(message.to_string())),
            finished_at: Some(Some(Utc::now())),
            ..JobPatch::default()
        };
        if let Err(e) = self.store.job_update(job_id, &patch).await {
            tracing::error!(job_id = %job_id, error = %e, "could not persist failure state");
        }
        let event = BuildEventInput::new("job.failed", "Complete", StepStatus::Failed)
            .with_level(EventLevel::Error)
            .with_message(message);
        if let Err(e) = self.store.append_event(job_id, event).await {
            tracing::error!(job_id = %job_id, error = %e, "could not append failure event");
        }
    }

    fn check_cancel(cancel: &watch::Receiver<bool>) -> SyllabResult<()> {
        if *cancel.borrow() {
            Err(EngineError::Canceled.into())
        } else {
            Ok(())
        }
    }

    fn heartbeat_guard(&self, job_id: EntityId) -> HeartbeatGuard {
        HeartbeatGuard::new(self.store.clone(), job_id, self.config.heartbeat_interval)
    }

    async fn execute(
        &self,
        job_id: EntityId,
        cancel: watch::Receiver<bool>,
    ) -> SyllabResult<()> {
        let job = self.store.job_get(job_id).await?;
        let profile: StudentProfile = serde_json::from_value(job.input_profile.clone())
            .map_err(|e| EngineError::InvalidProfile {
                job_id,
                reason: e.to_string(),
            })?;
        let policy = LanguagePolicy::resolve(
            &profile.content_language,
            &profile.instruction_language,
            profile.strict_target_language,
        );
        let checkpoint = job.checkpoint();
        let is_retry = job.retry_count > 0;

        let started_message = if is_retry {
            format!(
                "Program build worker started (retry #{}, resuming from: {})",
                job.retry_count,
                checkpoint.resume_from()
            )
        } else {
            "Program build worker started".to_string()
        };
        self.store
            .append_event(
                job_id,
                BuildEventInput::new("job.started", "Initialize", StepStatus::InProgress)
                    .with_message(started_message)
                    .with_payload(json!({
                        "program_id": job.program_id,
                        "is_retry": is_retry,
                        "checkpoint": checkpoint,
                    })),
            )
            .await?;

        // ------------------------------------------------------------------
        // Phase: plan
        // ------------------------------------------------------------------
        Self::check_cancel(&cancel)?;
        self.store
            .job_update(
                job_id,
                &JobPatch {
                    current_phase: Some(Phase::Plan),
                    current_item: Some(Some("program-blueprint".to_string())),
                    ..JobPatch::default()
                },
            )
            .await?;

        let blueprint = self
            .ensure_blueprint(job_id, &job.plan, &checkpoint, &profile, &policy)
            .await?;

        // ------------------------------------------------------------------
        // Phase: modules
        // ------------------------------------------------------------------
        let mut failed_modules = 0u32;
        let start_module = checkpoint.module_index.map_or(0, |i| i + 1);
        for module in blueprint.modules.iter().filter(|m| m.index >= start_module) {
            Self::check_cancel(&cancel)?;
            let ok = self
                .process_module(job_id, job.program_id, &profile, module, &policy, &checkpoint, &cancel)
                .await?;
            if !ok {
                failed_modules += 1;
            }

            // The checkpoint advances even past a failed module: retries
            // move forward, the module stays marked Failed for inspection.
            self.store
                .update_checkpoint(job_id, &CheckpointPatch::module(module.index))
                .await?;
            self.refresh_counters(job_id, job.program_id).await?;
        }

        // ------------------------------------------------------------------
        // Phase: assessments
        // ------------------------------------------------------------------
        Self::check_cancel(&cancel)?;
        self.store
            .job_update(
                job_id,
                &JobPatch {
                    current_phase: Some(Phase::Assessments),
                    current_item: Some(Some("final-exam".to_string())),
                    ..JobPatch::default()
                },
            )
            .await?;
        self.store
            .append_event(
                job_id,
                BuildEventInput::new(
                    "phase.assessments.started",
                    "Assessments",
                    StepStatus::InProgress,
                )
                .with_message("Generating cross-module final assessment artifacts"),
            )
            .await?;
        self.ensure_final_exam(job_id, job.program_id, &blueprint, &policy)
            .await?;
        self.store
            .append_event(
                job_id,
                BuildEventInput::new(
                    "phase.assessments.completed",
                    "Assessments",
                    StepStatus::Completed,
                )
                .with_message("Assessment generation completed"),
            )
            .await?;

        // ------------------------------------------------------------------
        // Phase: schedule
        // ------------------------------------------------------------------
        Self::check_cancel(&cancel)?;
        self.store
            .job_update(
                job_id,
                &JobPatch {
                    current_phase: Some(Phase::Schedule),
                    current_item: Some(Some("build-calendar".to_string())),
                    ..JobPatch::default()
                },
            )
            .await?;
        self.store
            .append_event(
                job_id,
                BuildEventInput::new("phase.schedule.started", "Schedule", StepStatus::InProgress)
                    .with_message("Building deterministic schedule"),
            )
            .await?;
        self.build_schedule(job.program_id, &profile).await?;
        self.store
            .append_event(
                job_id,
                BuildEventInput::new("phase.schedule.completed", "Schedule", StepStatus::Completed)
                    .with_message("Schedule generated and persisted"),
            )
            .await?;

        // ------------------------------------------------------------------
        // Completion
        // ------------------------------------------------------------------
        self.store
            .program_set_status(job.program_id, ProgramStatus::Active)
            .await?;
        let completion_error = (failed_modules > 0).then(|| {
            format!("Completed with {failed_modules} module(s) having failures. Check event log.")
        });
        self.store
            .job_update(
                job_id,
                &JobPatch {
                    status: Some(JobStatus::Completed),
                    current_phase: Some(Phase::Completed),
                    current_item: Some(None),
                    error: Some(completion_error.clone()),
                    finished_at: Some(Some(Utc::now())),
                    ..JobPatch::default()
                },
            )
            .await?;
        self.refresh_counters(job_id, job.program_id).await?;

        let (level, message) = if failed_modules > 0 {
            (
                EventLevel::Warn,
                format!("Program build finished with partial failures ({failed_modules} modules)."),
            )
        } else {
            (
                EventLevel::Info,
                "Program build finished successfully.".to_string(),
            )
        };
        self.store
            .append_event(
                job_id,
                BuildEventInput::new("job.completed", "Complete", StepStatus::Completed)
                    .with_level(level)
                    .with_message(message)
                    .with_payload(json!({ "failed_modules": failed_modules })),
            )
            .await?;

        tracing::info!(
            job_id = %job_id,
            program_id = %job.program_id,
            failed_modules,
            "program build completed"
        );
        Ok(())
    }

    /// Reuse the stored blueprint when a previous attempt passed planning;
    /// otherwise generate, language-check, normalize and persist.
    async fn ensure_blueprint(
        &self,
        job_id: EntityId,
        stored_plan: &Option<serde_json::Value>,
        checkpoint: &Checkpoint,
        profile: &StudentProfile,
        policy: &LanguagePolicy,
    ) -> SyllabResult<ProgramBlueprint> {
        if checkpoint.step_key.is_some() {
            if let Some(plan) = stored_plan {
                let blueprint: ProgramBlueprint = serde_json::from_value(plan.clone())
                    .map_err(|e| EngineError::InvalidBlueprint {
                        job_id,
                        reason: e.to_string(),
                    })?;
                self.store
                    .append_event(
                        job_id,
                        BuildEventInput::new("phase.plan.skipped", "Plan", StepStatus::Skipped)
                            .with_message("Using existing blueprint from previous run"),
                    )
                    .await?;
                return Ok(blueprint);
            }
        }

        // A planner error here escapes and fails the whole job; without a
        // blueprint nothing downstream can run.
        let raw = {
            let _hb = self.heartbeat_guard(job_id);
            self.generators
                .planner
                .generate_program(profile, policy)
                .await
                .map_err(SyllabError::from)?
        };
        let raw = self.repair_blueprint_language(job_id, raw, profile, policy).await;
        let blueprint = raw.normalized();

        self.store.persist_blueprint(job_id, &blueprint).await?;
        self.store
            .update_checkpoint(job_id, &CheckpointPatch::plan())
            .await?;

        let lesson_count: i32 = blueprint.modules.iter().map(|m| m.lessons_count).sum();
        self.store
            .append_event(
                job_id,
                BuildEventInput::new("phase.plan.completed", "Plan", StepStatus::Completed)
                    .with_message("Program blueprint planned and persisted")
                    .with_payload(json!({
                        "module_count": blueprint.modules.len(),
                        "lesson_count": lesson_count,
                    })),
            )
            .await?;
        Ok(blueprint)
    }

    /// One regeneration attempt when the blueprint breaks the language
    /// policy; the original draft is kept when the repair fails or is no
    /// better.
    async fn repair_blueprint_language(
        &self,
        job_id: EntityId,
        blueprint: ProgramBlueprint,
        profile: &StudentProfile,
        policy: &LanguagePolicy,
    ) -> ProgramBlueprint {
        let as_json = match serde_json::to_value(&blueprint) {
            Ok(v) => v,
            Err(_) => return blueprint,
        };
        if !policy.violates(&as_json) {
            return blueprint;
        }

        tracing::warn!(job_id = %job_id, "blueprint violates language policy, regenerating once");
        let _hb = self.heartbeat_guard(job_id);
        match self.generators.planner.generate_program(profile, policy).await {
            Ok(repaired) => repaired,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "blueprint repair failed, keeping draft");
                blueprint
            }
        }
    }

    /// Build one module. `Ok(false)` means the module failed but the job
    /// continues; only cancellation and job-level store errors propagate.
    #[allow(clippy::too_many_arguments)]
    async fn process_module(
        &self,
        job_id: EntityId,
        program_id: EntityId,
        profile: &StudentProfile,
        module: &ModuleBlueprint,
        policy: &LanguagePolicy,
        checkpoint: &Checkpoint,
        cancel: &watch::Receiver<bool>,
    ) -> SyllabResult<bool> {
        let step = module_step(module.index);

        let Some(row) = self.store.module_by_index(program_id, module.index).await? else {
            self.store
                .append_event(
                    job_id,
                    BuildEventInput::new("module.failed", &step, StepStatus::Failed)
                        .with_level(EventLevel::Error)
                        .with_message(format!(
                            "Module record not found for index {}",
                            module.index
                        )),
                )
                .await?;
            return Ok(false);
        };

        if row.build_status == BuildStatus::Completed {
            self.store
                .append_event(
                    job_id,
                    BuildEventInput::new("module.skipped", &step, StepStatus::Skipped)
                        .with_message(format!("Module already completed: {}", row.title)),
                )
                .await?;
            return Ok(true);
        }

        self.store
            .module_set_status(row.id, BuildStatus::InProgress, None)
            .await?;
        self.store
            .job_update(
                job_id,
                &JobPatch {
                    current_phase: Some(Phase::Module),
                    current_item: Some(Some(row.title.clone())),
                    ..JobPatch::default()
                },
            )
            .await?;
        self.store
            .append_event(
                job_id,
                BuildEventInput::new("module.started", &step, StepStatus::InProgress)
                    .with_message(format!("Starting module: {}", row.title))
                    .with_payload(json!({
                        "module_id": row.id,
                        "module_index": module.index,
                        "module_title": row.title,
                    })),
            )
            .await?;

        match self
            .build_module_content(job_id, program_id, profile, module, &row, policy, checkpoint, cancel)
            .await
        {
            Ok(()) => {
                self.store
                    .module_set_status(row.id, BuildStatus::Completed, None)
                    .await?;
                self.store
                    .append_event(
                        job_id,
                        BuildEventInput::new("module.completed", &step, StepStatus::Completed)
                            .with_message(format!("Completed module: {}", row.title))
                            .with_payload(json!({ "module_id": row.id })),
                    )
                    .await?;
                Ok(true)
            }
            Err(SyllabError::Engine(EngineError::Canceled)) => Err(EngineError::Canceled.into()),
            Err(e) => {
                let message = e.to_string();
                self.store
                    .module_set_status(row.id, BuildStatus::Failed, Some(&message))
                    .await?;
                self.store
                    .append_event(
                        job_id,
                        BuildEventInput::new("module.failed", &step, StepStatus::Failed)
                            .with_level(EventLevel::Error)
                            .with_message(message)
                            .with_payload(json!({ "module_id": row.id })),
                    )
                    .await?;
                Ok(false)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn build_module_content(
        &self,
        job_id: EntityId,
        program_id: EntityId,
        profile: &StudentProfile,
        module: &ModuleBlueprint,
        row: &ModuleRow,
        policy: &LanguagePolicy,
        checkpoint: &Checkpoint,
        cancel: &watch::Receiver<bool>,
    ) -> SyllabResult<()> {
        let lessons = self
            .ensure_lesson_plan(job_id, profile, module, row, policy)
            .await?;

        // Lesson resume only applies inside the checkpointed module; any
        // later module starts from its first lesson.
        let start_lesson = match (checkpoint.module_index, checkpoint.lesson_index) {
            (Some(m), Some(l)) if m == module.index => l + 1,
            _ => 0,
        };

        for lesson in lessons.iter().filter(|l| l.index >= start_lesson) {
            Self::check_cancel(cancel)?;
            self.process_lesson(job_id, profile, module, lesson, policy)
                .await?;
            self.store
                .update_checkpoint(job_id, &CheckpointPatch::lesson(module.index, lesson.index))
                .await?;
        }

        self.ensure_module_quiz(job_id, program_id, module, row.id, policy)
            .await?;
        Ok(())
    }

    /// Reuse persisted lesson rows when enough exist; otherwise plan the
    /// module's lessons once, padding short generator output with fallback
    /// plans, and upsert the rows.
    async fn ensure_lesson_plan(
        &self,
        job_id: EntityId,
        profile: &StudentProfile,
        module: &ModuleBlueprint,
        row: &ModuleRow,
        policy: &LanguagePolicy,
    ) -> SyllabResult<Vec<LessonRow>> {
        let required = module.lessons_count.clamp(1, MAX_LESSONS_PER_MODULE as i32) as usize;
        let existing = self.store.lessons_for_module(row.id).await?;
        if existing.len() >= required {
            return Ok(existing.into_iter().take(required).collect());
        }

        let step = module_step(module.index);
        self.store
            .append_event(
                job_id,
                BuildEventInput::new("module.plan_lessons.started", &step, StepStatus::InProgress)
                    .with_message(format!("Planning {required} lessons for {}", module.title)),
            )
            .await?;

        let planned = {
            let _hb = self.heartbeat_guard(job_id);
            match self
                .generators
                .lesson_planner
                .plan_lessons(profile, module, required, policy)
                .await
            {
                Ok(plans) => plans,
                Err(e) => {
                    tracing::warn!(
                        job_id = %job_id,
                        module_index = module.index,
                        error = %e,
                        "lesson planning failed, using fallback plans"
                    );
                    Vec::new()
                }
            }
        };

        let mut rows = Vec::with_capacity(required);
        for index in 0..required {
            let plan = planned
                .get(index)
                .cloned()
                .unwrap_or_else(|| module.fallback_lesson_plan(index));
            rows.push(self.store.upsert_lesson(row.id, index as i32, &plan).await?);
        }

        self.store
            .append_event(
                job_id,
                BuildEventInput::new("module.plan_lessons.completed", &step, StepStatus::Completed)
                    .with_message(format!("Lesson plan generated for {}", module.title))
                    .with_payload(json!({ "lesson_count": required })),
            )
            .await?;
        Ok(rows)
    }

    /// Build one lesson's artifacts. Each generation stage is independently
    /// guarded with a deterministic fallback; the commit at the end is a
    /// single transaction that also flags the lesson Completed.
    async fn process_lesson(
        &self,
        job_id: EntityId,
        profile: &StudentProfile,
        module: &ModuleBlueprint,
        lesson: &LessonRow,
        policy: &LanguagePolicy,
    ) -> SyllabResult<()> {
        if lesson.build_status == BuildStatus::Completed {
            return Ok(());
        }

        let step = lesson_step(module.index, lesson.index);
        let plan = lesson.as_plan();

        self.store
            .lesson_set_status(lesson.id, BuildStatus::InProgress, None)
            .await?;
        self.store
            .append_event(
                job_id,
                BuildEventInput::new("lesson.started", &step, StepStatus::InProgress)
                    .with_message(format!("Building lesson: {}", plan.title))
                    .with_payload(json!({
                        "module_id": lesson.module_id,
                        "lesson_id": lesson.id,
                        "lesson_index": lesson.index,
                        "lesson_title": plan.title,
                    })),
            )
            .await?;

        let resources = self
            .gather_resources(job_id, &step, profile, module, &plan, policy)
            .await?;
        let notes = self
            .draft_notes(job_id, &step, module, &plan, &resources, policy)
            .await?;
        let exercises = self
            .generate_exercises(job_id, &step, &plan, policy)
            .await?;

        self.store
            .append_event(
                job_id,
                BuildEventInput::new("lesson.review.started", &step, StepStatus::InProgress)
                    .with_message("Reviewing and refining draft artifacts"),
            )
            .await?;
        let notes = self.refine_notes(job_id, &plan, notes, policy).await;
        // Exercises are committed as drafted; a second generation pass over
        // an already validated set degrades schema fidelity.
        self.store
            .append_event(
                job_id,
                BuildEventInput::new("lesson.review.completed", &step, StepStatus::Completed)
                    .with_message("Lesson review completed"),
            )
            .await?;

        self.store
            .commit_lesson_artifacts(
                lesson.id,
                &LessonArtifacts {
                    resources,
                    notes: notes.clone(),
                    exercises,
                },
            )
            .await?;

        self.store
            .append_event(
                job_id,
                BuildEventInput::new("lesson.completed", &step, StepStatus::Completed)
                    .with_message(format!("Lesson ready: {}", plan.title))
                    .with_payload(json!({
                        "lesson_id": lesson.id,
                        "module_id": lesson.module_id,
                        "summary": notes.summary,
                    })),
            )
            .await?;
        Ok(())
    }

    async fn gather_resources(
        &self,
        job_id: EntityId,
        step: &str,
        profile: &StudentProfile,
        module: &ModuleBlueprint,
        plan: &LessonPlan,
        policy: &LanguagePolicy,
    ) -> SyllabResult<Vec<ResourceCandidate>> {
        self.store
            .append_event(
                job_id,
                BuildEventInput::new("lesson.gather_context.started", step, StepStatus::InProgress)
                    .with_message("Gathering learning resources"),
            )
            .await?;

        let result = {
            let _hb = self.heartbeat_guard(job_id);
            self.generators
                .curator
                .find_resources(&profile.topic, plan, &module.title, policy)
                .await
        };

        match result {
            Ok(resources) => {
                self.store
                    .append_event(
                        job_id,
                        BuildEventInput::new(
                            "lesson.gather_context.completed",
                            step,
                            StepStatus::Completed,
                        )
                        .with_message(format!("Gathered {} resources", resources.len())),
                    )
                    .await?;
                Ok(resources)
            }
            Err(e) => {
                self.store
                    .append_event(
                        job_id,
                        BuildEventInput::new(
                            "lesson.gather_context.failed",
                            step,
                            StepStatus::Failed,
                        )
                        .with_level(EventLevel::Warn)
                        .with_message(e.to_string()),
                    )
                    .await?;
                Ok(Vec::new())
            }
        }
    }

    async fn draft_notes(
        &self,
        job_id: EntityId,
        step: &str,
        module: &ModuleBlueprint,
        plan: &LessonPlan,
        resources: &[ResourceCandidate],
        policy: &LanguagePolicy,
    ) -> SyllabResult<LessonNotes> {
        self.store
            .append_event(
                job_id,
                BuildEventInput::new("lesson.draft.started", step, StepStatus::InProgress)
                    .with_message("Drafting lesson notes and practice content"),
            )
            .await?;

        let result = {
            let _hb = self.heartbeat_guard(job_id);
            self.generators
                .builder
                .build_notes(plan, resources, &module.title, policy)
                .await
        };

        match result {
            Ok(notes) => {
                let notes = self.repair_notes_language(job_id, plan, notes, policy).await;
                self.store
                    .append_event(
                        job_id,
                        BuildEventInput::new("lesson.draft.completed", step, StepStatus::Completed)
                            .with_message("Lesson notes drafted"),
                    )
                    .await?;
                Ok(notes)
            }
            Err(e) => {
                self.store
                    .append_event(
                        job_id,
                        BuildEventInput::new("lesson.draft.failed", step, StepStatus::Failed)
                            .with_level(EventLevel::Warn)
                            .with_message(e.to_string()),
                    )
                    .await?;
                Ok(fallback::fallback_notes(plan, policy))
            }
        }
    }

    /// Exactly one repair attempt; a failed or still-violating repair keeps
    /// the original draft.
    async fn repair_notes_language(
        &self,
        job_id: EntityId,
        plan: &LessonPlan,
        notes: LessonNotes,
        policy: &LanguagePolicy,
    ) -> LessonNotes {
        let as_json = match serde_json::to_value(&notes) {
            Ok(v) => v,
            Err(_) => return notes,
        };
        if !policy.violates(&as_json) {
            return notes;
        }

        tracing::warn!(job_id = %job_id, lesson = %plan.title, "notes violate language policy, repairing once");
        let _hb = self.heartbeat_guard(job_id);
        match self
            .generators
            .builder
            .repair_notes(plan, &notes, policy)
            .await
        {
            Ok(repaired) => repaired,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "notes repair failed, keeping draft");
                notes
            }
        }
    }

    /// Second-pass QA review of the drafted notes, applied to generated and
    /// fallback drafts alike. A failed review keeps the draft.
    async fn refine_notes(
        &self,
        job_id: EntityId,
        plan: &LessonPlan,
        notes: LessonNotes,
        policy: &LanguagePolicy,
    ) -> LessonNotes {
        let _hb = self.heartbeat_guard(job_id);
        match self
            .generators
            .builder
            .refine_notes(plan, &notes, policy)
            .await
        {
            Ok(refined) => refined,
            Err(e) => {
                tracing::warn!(job_id = %job_id, lesson = %plan.title, error = %e, "notes review failed, keeping draft");
                notes
            }
        }
    }

    async fn generate_exercises(
        &self,
        job_id: EntityId,
        step: &str,
        plan: &LessonPlan,
        policy: &LanguagePolicy,
    ) -> SyllabResult<ExerciseSet> {
        let result = {
            let _hb = self.heartbeat_guard(job_id);
            self.generators
                .exercises
                .generate_exercise_set(plan, policy)
                .await
        };

        match result {
            Ok(set) => Ok(self.repair_exercises_language(job_id, plan, set, policy).await),
            Err(e) => {
                self.store
                    .append_event(
                        job_id,
                        BuildEventInput::new("lesson.exercises.failed", step, StepStatus::Failed)
                            .with_level(EventLevel::Warn)
                            .with_message(e.to_string()),
                    )
                    .await?;
                Ok(fallback::fallback_exercise_set(plan, policy))
            }
        }
    }

    /// The exercise generator has no repair seam; the single repair attempt
    /// is one regeneration.
    async fn repair_exercises_language(
        &self,
        job_id: EntityId,
        plan: &LessonPlan,
        set: ExerciseSet,
        policy: &LanguagePolicy,
    ) -> ExerciseSet {
        let as_json = match serde_json::to_value(&set) {
            Ok(v) => v,
            Err(_) => return set,
        };
        if !policy.violates(&as_json) {
            return set;
        }

        tracing::warn!(job_id = %job_id, lesson = %plan.title, "exercises violate language policy, regenerating once");
        let _hb = self.heartbeat_guard(job_id);
        match self
            .generators
            .exercises
            .generate_exercise_set(plan, policy)
            .await
        {
            Ok(regenerated) => regenerated,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "exercise repair failed, keeping draft");
                set
            }
        }
    }

    /// Generate the module quiz unless one already exists. A generation
    /// failure stores an empty fallback quiz so scheduling still works.
    async fn ensure_module_quiz(
        &self,
        job_id: EntityId,
        program_id: EntityId,
        module: &ModuleBlueprint,
        module_id: EntityId,
        policy: &LanguagePolicy,
    ) -> SyllabResult<()> {
        if self
            .store
            .assessment_exists(program_id, Some(module_id), AssessmentKind::Quiz)
            .await?
        {
            return Ok(());
        }

        let step = module_step(module.index);
        let result = {
            let _hb = self.heartbeat_guard(job_id);
            self.generators
                .assessments
                .generate_quiz(module, QUIZ_QUESTION_COUNT, policy)
                .await
        };

        match result {
            Ok(quiz) => {
                let quiz = self.repair_quiz_language(job_id, module, quiz, policy).await;
                self.store
                    .create_assessment(program_id, Some(module_id), AssessmentKind::Quiz, &quiz)
                    .await?;
                self.store
                    .append_event(
                        job_id,
                        BuildEventInput::new("module.quiz.completed", &step, StepStatus::Completed)
                            .with_message(format!("Quiz generated for {}", module.title)),
                    )
                    .await?;
            }
            Err(e) => {
                self.store
                    .create_assessment(
                        program_id,
                        Some(module_id),
                        AssessmentKind::Quiz,
                        &fallback::fallback_quiz(module),
                    )
                    .await?;
                self.store
                    .append_event(
                        job_id,
                        BuildEventInput::new("module.quiz.failed", &step, StepStatus::Failed)
                            .with_level(EventLevel::Warn)
                            .with_message(format!("{e} (fallback quiz created)")),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn repair_quiz_language(
        &self,
        job_id: EntityId,
        module: &ModuleBlueprint,
        quiz: Assessment,
        policy: &LanguagePolicy,
    ) -> Assessment {
        let as_json = match serde_json::to_value(&quiz) {
            Ok(v) => v,
            Err(_) => return quiz,
        };
        if !policy.violates(&as_json) {
            return quiz;
        }

        tracing::warn!(job_id = %job_id, module_index = module.index, "quiz violates language policy, regenerating once");
        let _hb = self.heartbeat_guard(job_id);
        match self
            .generators
            .assessments
            .generate_quiz(module, QUIZ_QUESTION_COUNT, policy)
            .await
        {
            Ok(regenerated) => regenerated,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "quiz repair failed, keeping draft");
                quiz
            }
        }
    }

    /// Generate the program final exam exactly once. Failures degrade to an
    /// empty fallback exam with a WARN event.
    async fn ensure_final_exam(
        &self,
        job_id: EntityId,
        program_id: EntityId,
        blueprint: &ProgramBlueprint,
        policy: &LanguagePolicy,
    ) -> SyllabResult<()> {
        if self
            .store
            .assessment_exists(program_id, None, AssessmentKind::Exam)
            .await?
        {
            return Ok(());
        }

        let result = {
            let _hb = self.heartbeat_guard(job_id);
            self.generators
                .assessments
                .generate_final_exam(&blueprint.title, &blueprint.modules, EXAM_QUESTION_COUNT, policy)
                .await
        };

        match result {
            Ok(exam) => {
                self.store
                    .create_assessment(program_id, None, AssessmentKind::Exam, &exam)
                    .await?;
            }
            Err(e) => {
                self.store
                    .create_assessment(
                        program_id,
                        None,
                        AssessmentKind::Exam,
                        &fallback::fallback_exam(),
                    )
                    .await?;
                self.store
                    .append_event(
                        job_id,
                        BuildEventInput::new("final_exam.failed", "Assessments", StepStatus::Failed)
                            .with_level(EventLevel::Warn)
                            .with_message(format!("{e} (fallback exam created)")),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Rebuild the schedule from scratch; it is derived data and never
    /// checkpointed.
    async fn build_schedule(
        &self,
        program_id: EntityId,
        profile: &StudentProfile,
    ) -> SyllabResult<()> {
        let lessons: Vec<LessonSlot> = self
            .store
            .lessons_for_program(program_id)
            .await?
            .into_iter()
            .map(|(_, lesson)| LessonSlot {
                id: lesson.id,
                estimated_minutes: lesson.estimated_minutes,
            })
            .collect();
        let (quizzes, exam) = self.store.assessments_for_schedule(program_id).await?;

        let items = scheduler::build_schedule(profile.hours_per_day, &lessons, &quizzes, exam);
        self.store
            .replace_schedule(program_id, Utc::now(), &items)
            .await?;
        Ok(())
    }

    async fn refresh_counters(&self, job_id: EntityId, program_id: EntityId) -> SyllabResult<()> {
        let completed_modules = self
            .store
            .count_modules(program_id, BuildStatus::Completed)
            .await?;
        let completed_lessons = self
            .store
            .count_lessons(program_id, BuildStatus::Completed)
            .await?;
        self.store
            .job_update(
                job_id,
                &JobPatch {
                    completed_modules: Some(completed_modules as i32),
                    completed_lessons: Some(completed_lessons as i32),
                    ..JobPatch::default()
                },
            )
            .await?;
        Ok(())
    }
}
