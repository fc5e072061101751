//! Enum types for SYLLAB entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// JOB ENUMS
// ============================================================================

/// Status of a build job over its lifetime.
///
/// A job is created `Queued`, transitions to `Running` exactly once per
/// claim, and terminates in `Completed`, `Failed`, or `Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Canceled => "CANCELED",
        }
    }

    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(JobStatus::Queued),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELED" => Ok(JobStatus::Canceled),
            other => Err(ParseEnumError::new("JobStatus", other)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Status of a single build step as recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

impl StepStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::InProgress => "IN_PROGRESS",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Skipped => "SKIPPED",
            StepStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for StepStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(StepStatus::Pending),
            "IN_PROGRESS" => Ok(StepStatus::InProgress),
            "COMPLETED" => Ok(StepStatus::Completed),
            "SKIPPED" => Ok(StepStatus::Skipped),
            "FAILED" => Ok(StepStatus::Failed),
            other => Err(ParseEnumError::new("StepStatus", other)),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Severity level of a build event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EventLevel {
    #[default]
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "INFO",
            EventLevel::Warn => "WARN",
            EventLevel::Error => "ERROR",
        }
    }
}

impl FromStr for EventLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(EventLevel::Info),
            "WARN" => Ok(EventLevel::Warn),
            "ERROR" => Ok(EventLevel::Error),
            other => Err(ParseEnumError::new("EventLevel", other)),
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

// ============================================================================
// CONTENT ENUMS
// ============================================================================

/// Build status of a module or lesson row.
///
/// Rows are created `Pending` during planning, move to `InProgress` when the
/// pipeline claims them, and end `Completed` or `Failed` when their content
/// artifacts are committed. A `Completed` row is never reprocessed by a
/// later resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BuildStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl BuildStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "PENDING",
            BuildStatus::InProgress => "IN_PROGRESS",
            BuildStatus::Completed => "COMPLETED",
            BuildStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for BuildStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BuildStatus::Pending),
            "IN_PROGRESS" => Ok(BuildStatus::InProgress),
            "COMPLETED" => Ok(BuildStatus::Completed),
            "FAILED" => Ok(BuildStatus::Failed),
            other => Err(ParseEnumError::new("BuildStatus", other)),
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Status of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProgramStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

impl ProgramStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ProgramStatus::Draft => "DRAFT",
            ProgramStatus::Active => "ACTIVE",
            ProgramStatus::Archived => "ARCHIVED",
        }
    }
}

impl FromStr for ProgramStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(ProgramStatus::Draft),
            "ACTIVE" => Ok(ProgramStatus::Active),
            "ARCHIVED" => Ok(ProgramStatus::Archived),
            other => Err(ParseEnumError::new("ProgramStatus", other)),
        }
    }
}

/// Pipeline phase of a running build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Queued,
    Plan,
    Module,
    Assessments,
    Schedule,
    Completed,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Queued => "queued",
            Phase::Plan => "plan",
            Phase::Module => "module",
            Phase::Assessments => "assessments",
            Phase::Schedule => "schedule",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a placed schedule unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleItemType {
    Lesson,
    Exercise,
    Review,
    Quiz,
    Exam,
}

impl ScheduleItemType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ScheduleItemType::Lesson => "LESSON",
            ScheduleItemType::Exercise => "EXERCISE",
            ScheduleItemType::Review => "REVIEW",
            ScheduleItemType::Quiz => "QUIZ",
            ScheduleItemType::Exam => "EXAM",
        }
    }
}

impl FromStr for ScheduleItemType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LESSON" => Ok(ScheduleItemType::Lesson),
            "EXERCISE" => Ok(ScheduleItemType::Exercise),
            "REVIEW" => Ok(ScheduleItemType::Review),
            "QUIZ" => Ok(ScheduleItemType::Quiz),
            "EXAM" => Ok(ScheduleItemType::Exam),
            other => Err(ParseEnumError::new("ScheduleItemType", other)),
        }
    }
}

impl fmt::Display for ScheduleItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Error returned when a database string does not map to an enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {enum_name} value: {value}")]
pub struct ParseEnumError {
    pub enum_name: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(enum_name: &'static str, value: &str) -> Self {
        Self {
            enum_name,
            value: value.to_string(),
        }
    }
}
