//! Build job and event records
//!
//! The build job row is the single serialization point for "is this job
//! being worked on": the lease (status + heartbeat), the checkpoint, the
//! retry budget, and the event cursor all live on it. Build events form the
//! append-only, gapless per-job log that backs both audit and streaming.

use crate::enums::{EventLevel, JobStatus, Phase, StepStatus};
use crate::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ============================================================================
// BUILD JOB
// ============================================================================

/// One build attempt series for a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildJob {
    pub id: EntityId,
    pub user_id: EntityId,
    pub program_id: EntityId,

    pub status: JobStatus,
    /// Free-text phase label ("plan", "module", "assessments", ...).
    pub current_phase: String,
    /// Human label of the item being processed (module/lesson title).
    pub current_item: Option<String>,

    // Counters are derived from persisted entity counts, never incremented
    // independently.
    pub total_modules: i32,
    pub completed_modules: i32,
    pub total_lessons: i32,
    pub completed_lessons: i32,

    pub retry_count: i32,
    pub max_retries: i32,

    /// Index of the last module whose artifacts fully committed.
    /// Only ever written in increasing order within one job lifetime.
    pub last_completed_module_index: Option<i32>,
    /// Index of the last committed lesson, scoped to the module it was
    /// recorded under. Reset semantics are handled by the pipeline, not here.
    pub last_completed_lesson_index: Option<i32>,
    /// Free-form step token, e.g. "plan", "module_2", "module_2_lesson_5".
    pub last_completed_step_key: Option<String>,
    /// Opaque payload reserved for forward extension of the checkpoint.
    pub checkpoint_data: Option<JsonValue>,

    pub started_at: Option<Timestamp>,
    pub last_heartbeat_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,

    /// Serialized blueprint snapshot, present once planning completed.
    pub plan: Option<JsonValue>,
    /// Serialized onboarding profile the build was requested with.
    pub input_profile: JsonValue,

    /// Monotonic event cursor, mirrors the highest event index in the log.
    pub last_event_index: i64,

    /// Last hard failure reason, or the soft "completed with N module
    /// failure(s)" note on a partially failed completion.
    pub error: Option<String>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl BuildJob {
    /// Extract the checkpoint fields as one value.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            module_index: self.last_completed_module_index,
            lesson_index: self.last_completed_lesson_index,
            step_key: self.last_completed_step_key.clone(),
            data: self.checkpoint_data.clone(),
        }
    }

    /// Heartbeat reference point: the last heartbeat if one was ever
    /// recorded, otherwise the row's update time.
    pub fn heartbeat_at(&self) -> Timestamp {
        self.last_heartbeat_at.unwrap_or(self.updated_at)
    }
}

// ============================================================================
// CHECKPOINT
// ============================================================================

/// Durable marker of the last fully committed module/lesson/step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Checkpoint {
    pub module_index: Option<i32>,
    pub lesson_index: Option<i32>,
    pub step_key: Option<String>,
    pub data: Option<JsonValue>,
}

impl Checkpoint {
    /// Whether this job has ever committed anything.
    pub fn is_fresh(&self) -> bool {
        self.module_index.is_none() && self.step_key.is_none()
    }

    /// Display token for logs and retry responses.
    pub fn resume_from(&self) -> &str {
        self.step_key.as_deref().unwrap_or("start")
    }
}

/// Partial checkpoint update. Only provided fields are overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CheckpointPatch {
    pub module_index: Option<i32>,
    pub lesson_index: Option<i32>,
    pub step_key: Option<String>,
    pub data: Option<JsonValue>,
}

impl CheckpointPatch {
    /// Checkpoint a completed module.
    pub fn module(index: i32) -> Self {
        Self {
            module_index: Some(index),
            step_key: Some(format!("module_{index}")),
            ..Self::default()
        }
    }

    /// Checkpoint a committed lesson within a module.
    pub fn lesson(module_index: i32, lesson_index: i32) -> Self {
        Self {
            module_index: Some(module_index),
            lesson_index: Some(lesson_index),
            step_key: Some(format!("module_{module_index}_lesson_{lesson_index}")),
            ..Self::default()
        }
    }

    /// Checkpoint the completed planning phase.
    pub fn plan() -> Self {
        Self {
            step_key: Some("plan".to_string()),
            ..Self::default()
        }
    }
}

// ============================================================================
// JOB PATCH
// ============================================================================

/// Partial job-state update. `None` leaves a field untouched; the nested
/// `Option` on nullable columns distinguishes "set to null" from "skip".
///
/// Stores refresh `last_heartbeat_at` on every applied patch, so an empty
/// patch is a pure heartbeat touch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub current_phase: Option<Phase>,
    pub current_item: Option<Option<String>>,
    pub total_modules: Option<i32>,
    pub completed_modules: Option<i32>,
    pub total_lessons: Option<i32>,
    pub completed_lessons: Option<i32>,
    pub plan: Option<JsonValue>,
    pub error: Option<Option<String>>,
    pub started_at: Option<Option<Timestamp>>,
    pub finished_at: Option<Option<Timestamp>>,
}

impl JobPatch {
    /// A patch that only refreshes the heartbeat.
    pub fn heartbeat() -> Self {
        Self::default()
    }
}

// ============================================================================
// BUILD EVENT
// ============================================================================

/// Immutable event log record, keyed by `(job_id, index)` with `index`
/// strictly increasing from 1 and never reused, even across retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEvent {
    pub job_id: EntityId,
    pub index: i64,
    /// Dotted event name, e.g. "module.completed".
    pub event_type: String,
    /// Display label, e.g. "Module 2 / Lesson 5".
    pub step: String,
    pub status: StepStatus,
    pub level: EventLevel,
    pub message: Option<String>,
    pub payload: JsonValue,
    pub created_at: Timestamp,
}

/// Input for appending one event; the store allocates the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEventInput {
    pub event_type: String,
    pub step: String,
    pub status: StepStatus,
    pub level: EventLevel,
    pub message: Option<String>,
    pub payload: JsonValue,
}

impl BuildEventInput {
    /// Info-level event with an empty payload.
    pub fn new(event_type: impl Into<String>, step: impl Into<String>, status: StepStatus) -> Self {
        Self {
            event_type: event_type.into(),
            step: step.into(),
            status,
            level: EventLevel::Info,
            message: None,
            payload: JsonValue::Null,
        }
    }

    pub fn with_level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = payload;
        self
    }
}
