//! SYLLAB Gen - Content Generation Abstraction Layer
//!
//! Provider-agnostic traits for the content generators the build pipeline
//! orchestrates. This crate defines the interfaces and the shapes of the
//! structured content they return; actual provider implementations (model
//! selection, prompt text, schema repair loops) are user-supplied and never
//! inspected by the orchestrator; only return shapes and errors are.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use syllab_core::{
    GenError, LanguagePolicy, LessonPlan, ModuleBlueprint, ProgramBlueprint, StudentProfile,
};

/// Result alias for generator calls.
pub type GenResult<T> = Result<T, GenError>;

// ============================================================================
// GENERATED CONTENT TYPES
// ============================================================================

/// A curated learning resource candidate for one lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCandidate {
    /// Resource kind ("video", "article", "doc", ...).
    pub resource_type: String,
    pub title: String,
    pub url: String,
    pub duration_seconds: Option<i32>,
    /// Why the curator picked it, kept as source metadata.
    pub reason: Option<String>,
    pub quality_score: Option<f64>,
}

/// One glossary entry inside lesson notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub term: String,
    pub definition: String,
}

/// One guided-notes section inside lesson notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidedSection {
    pub section: String,
    pub content: String,
    pub questions: Vec<String>,
}

/// Drafted notes for one lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonNotes {
    pub summary: String,
    pub key_points: Vec<String>,
    pub glossary: Vec<GlossaryEntry>,
    pub guided_notes: Vec<GuidedSection>,
}

/// One practice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseQuestion {
    pub prompt: String,
    /// Question kind ("multiple_choice", "open", ...).
    pub kind: String,
    pub options: Vec<String>,
    pub answer: Option<String>,
    pub explanation: Option<String>,
}

/// A generated practice set for one lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSet {
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub estimated_minutes: i32,
    pub questions: Vec<ExerciseQuestion>,
    pub instructions: Option<String>,
}

/// A generated quiz or exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub title: String,
    pub questions: Vec<ExerciseQuestion>,
    pub rubric: Option<JsonValue>,
    pub passing_score: i32,
    pub time_limit_minutes: Option<i32>,
}

// ============================================================================
// GENERATOR TRAITS
// ============================================================================

/// Plans the overall program structure (modules, outcomes, lesson counts).
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CurriculumPlanner: Send + Sync {
    /// Generate a program blueprint for the given profile.
    ///
    /// The returned blueprint is normalized by the pipeline; implementations
    /// do not need to enforce the module/lesson caps themselves.
    async fn generate_program(
        &self,
        profile: &StudentProfile,
        policy: &LanguagePolicy,
    ) -> GenResult<ProgramBlueprint>;
}

/// Plans the individual lessons of one module.
#[async_trait]
pub trait LessonPlanner: Send + Sync {
    /// Plan exactly `count` lessons for the module. Implementations may
    /// return fewer; the pipeline pads with fallback entries.
    async fn plan_lessons(
        &self,
        profile: &StudentProfile,
        module: &ModuleBlueprint,
        count: usize,
        policy: &LanguagePolicy,
    ) -> GenResult<Vec<LessonPlan>>;
}

/// Gathers learning resources for one lesson.
#[async_trait]
pub trait ResourceCurator: Send + Sync {
    async fn find_resources(
        &self,
        topic: &str,
        lesson: &LessonPlan,
        module_title: &str,
        policy: &LanguagePolicy,
    ) -> GenResult<Vec<ResourceCandidate>>;
}

/// Drafts lesson notes from a lesson plan and curated resources.
#[async_trait]
pub trait LessonBuilder: Send + Sync {
    async fn build_notes(
        &self,
        lesson: &LessonPlan,
        resources: &[ResourceCandidate],
        module_title: &str,
        policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes>;

    /// One-shot language repair of a drafted notes payload. Called when the
    /// compliance check judged the draft non-compliant; on failure the
    /// pipeline keeps the original draft.
    async fn repair_notes(
        &self,
        lesson: &LessonPlan,
        notes: &LessonNotes,
        policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes>;

    /// Second-pass QA review of a drafted notes payload, run before the
    /// lesson commit. A failed review keeps the draft.
    async fn refine_notes(
        &self,
        lesson: &LessonPlan,
        notes: &LessonNotes,
        policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes>;
}

/// Generates the practice set of one lesson.
#[async_trait]
pub trait ExerciseGenerator: Send + Sync {
    async fn generate_exercise_set(
        &self,
        lesson: &LessonPlan,
        policy: &LanguagePolicy,
    ) -> GenResult<ExerciseSet>;
}

/// Generates module quizzes and the program final exam.
#[async_trait]
pub trait AssessmentGenerator: Send + Sync {
    async fn generate_quiz(
        &self,
        module: &ModuleBlueprint,
        question_count: usize,
        policy: &LanguagePolicy,
    ) -> GenResult<Assessment>;

    async fn generate_final_exam(
        &self,
        program_title: &str,
        modules: &[ModuleBlueprint],
        question_count: usize,
        policy: &LanguagePolicy,
    ) -> GenResult<Assessment>;
}

// ============================================================================
// GENERATOR SET
// ============================================================================

/// Bundle of all generator providers the pipeline needs, cloneable and
/// shareable across worker tasks.
#[derive(Clone)]
pub struct GeneratorSet {
    pub planner: Arc<dyn CurriculumPlanner>,
    pub lesson_planner: Arc<dyn LessonPlanner>,
    pub curator: Arc<dyn ResourceCurator>,
    pub builder: Arc<dyn LessonBuilder>,
    pub exercises: Arc<dyn ExerciseGenerator>,
    pub assessments: Arc<dyn AssessmentGenerator>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lesson_notes_serialization_round_trip() {
        let notes = LessonNotes {
            summary: "Ownership basics".to_string(),
            key_points: vec!["moves".to_string(), "borrows".to_string()],
            glossary: vec![GlossaryEntry {
                term: "borrow".to_string(),
                definition: "a reference without ownership".to_string(),
            }],
            guided_notes: vec![GuidedSection {
                section: "Core Objectives".to_string(),
                content: "moves; borrows".to_string(),
                questions: vec!["what moves?".to_string()],
            }],
        };

        let json = serde_json::to_value(&notes).unwrap();
        let back: LessonNotes = serde_json::from_value(json).unwrap();
        assert_eq!(back, notes);
    }

    #[test]
    fn test_assessment_serialization_round_trip() {
        let assessment = Assessment {
            title: "Final Exam".to_string(),
            questions: vec![ExerciseQuestion {
                prompt: "Explain lifetimes".to_string(),
                kind: "open".to_string(),
                options: vec![],
                answer: None,
                explanation: None,
            }],
            rubric: Some(serde_json::json!({"full_credit": "complete answer"})),
            passing_score: 70,
            time_limit_minutes: Some(90),
        };

        let json = serde_json::to_value(&assessment).unwrap();
        let back: Assessment = serde_json::from_value(json).unwrap();
        assert_eq!(back, assessment);
    }
}
