//! SYLLAB Core - Entity Types
//!
//! Pure data structures shared by every other crate: job and event records,
//! blueprint/profile types, enums, errors, and engine configuration.
//! This crate contains no I/O and no business logic.

pub mod blueprint;
pub mod config;
pub mod enums;
pub mod error;
pub mod job;
pub mod language;

use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

// Re-export the common surface so downstream crates can use
// `syllab_core::BuildJob` etc. directly.
pub use blueprint::{
    LessonPlan, ModuleBlueprint, ProgramBlueprint, StudentProfile, MAX_LESSONS_PER_MODULE,
    MAX_MODULES, MAX_OUTCOMES_PER_MODULE,
};
pub use config::EngineConfig;
pub use enums::{
    BuildStatus, EventLevel, JobStatus, Phase, ProgramStatus, ScheduleItemType, StepStatus,
};
pub use error::{EngineError, GenError, StoreError, SyllabError, SyllabResult};
pub use job::{BuildEvent, BuildEventInput, BuildJob, Checkpoint, CheckpointPatch, JobPatch};
pub use language::LanguagePolicy;
