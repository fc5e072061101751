//! SYLLAB Store - Persistence Layer
//!
//! Defines the `BuildStore` trait the engine and API are written against,
//! plus two implementations:
//!
//! - [`PgStore`]: PostgreSQL via deadpool-postgres. Lease claims and retry
//!   resets are single conditional UPDATE statements so the storage engine
//!   enforces exclusivity atomically.
//! - [`MemoryStore`]: in-process store behind one async mutex, used by
//!   tests. Claim atomicity holds by construction.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use syllab_core::{
    BuildEvent, BuildEventInput, BuildJob, BuildStatus, Checkpoint, CheckpointPatch, EntityId,
    JobPatch, LessonPlan, ProgramBlueprint, ProgramStatus, ScheduleItemType, StoreError,
    StudentProfile, Timestamp,
};
use syllab_gen::{Assessment, ExerciseSet, LessonNotes, ResourceCandidate};

pub use memory::MemoryStore;
pub use pg::{PgConfig, PgStore};

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// ROW TYPES
// ============================================================================

/// A program row as the orchestrator sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramRow {
    pub id: EntityId,
    pub user_id: EntityId,
    pub topic: String,
    pub status: ProgramStatus,
    pub updated_at: Timestamp,
}

/// A module row. Uniquely keyed by `(program_id, index)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRow {
    pub id: EntityId,
    pub program_id: EntityId,
    pub index: i32,
    pub title: String,
    pub outcomes: Vec<String>,
    pub build_status: BuildStatus,
    pub build_error: Option<String>,
}

/// A lesson row. Uniquely keyed by `(module_id, index)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonRow {
    pub id: EntityId,
    pub module_id: EntityId,
    pub index: i32,
    pub title: String,
    pub objectives: Vec<String>,
    pub estimated_minutes: i32,
    pub build_status: BuildStatus,
    pub build_error: Option<String>,
}

impl LessonRow {
    /// View of this row as a lesson plan, used when reusing a persisted
    /// lesson plan on resume.
    pub fn as_plan(&self) -> LessonPlan {
        LessonPlan {
            title: self.title.clone(),
            objectives: self.objectives.clone(),
            estimated_minutes: self.estimated_minutes,
        }
    }
}

/// All artifacts of one lesson, committed in a single transaction together
/// with the lesson's Completed flag so a crash mid-lesson never leaves a
/// partially written lesson visible as complete.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonArtifacts {
    pub resources: Vec<ResourceCandidate>,
    pub notes: LessonNotes,
    pub exercises: ExerciseSet,
}

/// Kind of a stored assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentKind {
    Quiz,
    Exam,
}

impl AssessmentKind {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AssessmentKind::Quiz => "QUIZ",
            AssessmentKind::Exam => "EXAM",
        }
    }
}

/// One schedule placement produced by the deterministic scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleItemInput {
    /// Calendar day offset from the schedule start date.
    pub day_offset: i32,
    pub item_type: ScheduleItemType,
    /// Lesson or assessment id the item refers to, if any.
    pub ref_id: Option<EntityId>,
    pub estimated_minutes: i32,
}

/// Outcome of an atomic claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now holds the lease; the job is Running.
    Claimed,
    /// Another worker holds a fresh lease.
    AlreadyRunning,
    /// The job is Completed or Canceled.
    AlreadyFinished,
}

/// Outcome of a retry reset attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReset {
    /// Job was requeued; checkpoint fields were preserved.
    Ok { retry_count: i32 },
    InvalidStatus,
    MaxRetriesReached,
}

/// Program tree snapshot for client consumption (the `partial` stream
/// event): the job plus its program's modules and lessons.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildView {
    pub job: BuildJob,
    pub program: ProgramRow,
    pub modules: Vec<ModuleNode>,
}

/// One module with its lessons inside a [`BuildView`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleNode {
    pub module: ModuleRow,
    pub lessons: Vec<LessonRow>,
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Every persistence operation the orchestrator and API depend on.
///
/// Heartbeat discipline: implementations must touch `last_heartbeat_at` on
/// every state-mutating job operation (`job_update`, claims, checkpoint
/// writes, event appends) so liveness stays visible without a dedicated
/// call.
#[async_trait]
pub trait BuildStore: Send + Sync {
    // ------------------------------------------------------------------
    // Job lifecycle
    // ------------------------------------------------------------------

    /// Create a Draft program and its Queued build job in one transaction.
    /// Returns `(job_id, program_id)`.
    async fn create_build(
        &self,
        user_id: EntityId,
        profile: &StudentProfile,
        max_retries: i32,
    ) -> StoreResult<(EntityId, EntityId)>;

    async fn job_get(&self, job_id: EntityId) -> StoreResult<BuildJob>;

    /// Apply a partial job-state update. Always refreshes the heartbeat.
    async fn job_update(&self, job_id: EntityId, patch: &JobPatch) -> StoreResult<()>;

    /// Atomically claim the job lease.
    ///
    /// Claims succeed when the job is Queued or Failed, or when it is
    /// Running with a heartbeat older than `steal_older_than` (None
    /// disallows stealing). The claim sets Running, records `started_at` on
    /// first claim, refreshes the heartbeat, and clears the error. The
    /// update is a single conditional write: two racing claimers get
    /// exactly one `Claimed`.
    async fn try_claim(
        &self,
        job_id: EntityId,
        steal_older_than: Option<Timestamp>,
    ) -> StoreResult<ClaimOutcome>;

    /// Force-fail a Running job whose heartbeat is older than `cutoff`.
    /// Returns whether the transition happened.
    async fn fail_if_heartbeat_older(
        &self,
        job_id: EntityId,
        cutoff: Timestamp,
        error: &str,
    ) -> StoreResult<bool>;

    /// Requeue a Failed job for retry, incrementing `retry_count` and
    /// clearing status/liveness/error fields while deliberately preserving
    /// the checkpoint so the retry resumes forward.
    async fn reset_for_retry(&self, job_id: EntityId) -> StoreResult<RetryReset>;

    /// Flip a Queued or Running job to Canceled. Returns whether the
    /// transition happened.
    async fn cancel_job(&self, job_id: EntityId) -> StoreResult<bool>;

    // ------------------------------------------------------------------
    // Checkpoint
    // ------------------------------------------------------------------

    async fn get_checkpoint(&self, job_id: EntityId) -> StoreResult<Checkpoint>;

    /// Partial checkpoint update; only provided fields are overwritten.
    async fn update_checkpoint(
        &self,
        job_id: EntityId,
        patch: &CheckpointPatch,
    ) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // Event log
    // ------------------------------------------------------------------

    /// Append one event, allocating the next gapless per-job index in the
    /// same transaction that advances the job's `last_event_index`.
    /// Returns the allocated index.
    async fn append_event(&self, job_id: EntityId, input: BuildEventInput) -> StoreResult<i64>;

    /// Ordered events with `index > after_index`.
    async fn events_since(
        &self,
        job_id: EntityId,
        after_index: i64,
    ) -> StoreResult<Vec<BuildEvent>>;

    // ------------------------------------------------------------------
    // Program content
    // ------------------------------------------------------------------

    async fn program_set_status(
        &self,
        program_id: EntityId,
        status: ProgramStatus,
    ) -> StoreResult<()>;

    /// Persist a freshly planned blueprint: replace the program's module
    /// rows with Pending rows, store the plan snapshot on the job, and set
    /// the total counters. Only called when the plan phase actually ran.
    async fn persist_blueprint(
        &self,
        job_id: EntityId,
        blueprint: &ProgramBlueprint,
    ) -> StoreResult<()>;

    async fn module_by_index(
        &self,
        program_id: EntityId,
        index: i32,
    ) -> StoreResult<Option<ModuleRow>>;

    async fn module_set_status(
        &self,
        module_id: EntityId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> StoreResult<()>;

    /// Lessons of a module in index order.
    async fn lessons_for_module(&self, module_id: EntityId) -> StoreResult<Vec<LessonRow>>;

    /// Upsert a lesson plan row by `(module_id, index)`. Creates Pending
    /// rows; updates only the plan fields of existing rows.
    async fn upsert_lesson(
        &self,
        module_id: EntityId,
        index: i32,
        plan: &LessonPlan,
    ) -> StoreResult<LessonRow>;

    async fn lesson_set_status(
        &self,
        lesson_id: EntityId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> StoreResult<()>;

    /// Commit all artifacts of one lesson atomically: replace resources,
    /// upsert notes, replace the exercise set, and flag the lesson
    /// Completed, in one transaction.
    async fn commit_lesson_artifacts(
        &self,
        lesson_id: EntityId,
        artifacts: &LessonArtifacts,
    ) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // Assessments and schedule
    // ------------------------------------------------------------------

    /// Whether an assessment of this kind exists for `(program, module)`;
    /// `module_id = None` matches program-level assessments only.
    async fn assessment_exists(
        &self,
        program_id: EntityId,
        module_id: Option<EntityId>,
        kind: AssessmentKind,
    ) -> StoreResult<bool>;

    async fn create_assessment(
        &self,
        program_id: EntityId,
        module_id: Option<EntityId>,
        kind: AssessmentKind,
        assessment: &Assessment,
    ) -> StoreResult<EntityId>;

    /// Assessment ids for schedule placement: module quizzes in module
    /// order, then the final exam (if any) last.
    async fn assessments_for_schedule(
        &self,
        program_id: EntityId,
    ) -> StoreResult<(Vec<EntityId>, Option<EntityId>)>;

    /// Delete any existing schedule for the program and write a fresh one.
    async fn replace_schedule(
        &self,
        program_id: EntityId,
        start_date: Timestamp,
        items: &[ScheduleItemInput],
    ) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // Rollups and views
    // ------------------------------------------------------------------

    /// Count of the program's modules with the given build status.
    async fn count_modules(
        &self,
        program_id: EntityId,
        status: BuildStatus,
    ) -> StoreResult<i64>;

    /// Count of the program's lessons (across all modules) with the given
    /// build status.
    async fn count_lessons(
        &self,
        program_id: EntityId,
        status: BuildStatus,
    ) -> StoreResult<i64>;

    /// Lessons of the whole program in module-index then lesson-index
    /// order, paired with their module index. Input to the scheduler.
    async fn lessons_for_program(
        &self,
        program_id: EntityId,
    ) -> StoreResult<Vec<(i32, LessonRow)>>;

    /// Job plus program/module/lesson tree for client consumption.
    async fn build_view(&self, job_id: EntityId) -> StoreResult<BuildView>;
}

/// Helper: serialize the checkpoint payload carried in events and retry
/// responses.
pub fn checkpoint_payload(checkpoint: &Checkpoint) -> JsonValue {
    serde_json::to_value(checkpoint).unwrap_or(JsonValue::Null)
}
