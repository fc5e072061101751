//! Generator provider wiring
//!
//! The orchestrator is provider-agnostic: model selection and prompt text
//! live outside this workspace. A server started without providers wired in
//! still runs; every generation call reports NotConfigured and the pipeline
//! degrades through its fallback artifacts.

use async_trait::async_trait;
use std::sync::Arc;
use syllab_core::{
    GenError, LanguagePolicy, LessonPlan, ModuleBlueprint, ProgramBlueprint, StudentProfile,
};
use syllab_gen::{
    Assessment, AssessmentGenerator, CurriculumPlanner, ExerciseGenerator, ExerciseSet, GenResult,
    GeneratorSet, LessonBuilder, LessonNotes, LessonPlanner, ResourceCandidate, ResourceCurator,
};

struct Unconfigured;

#[async_trait]
impl CurriculumPlanner for Unconfigured {
    async fn generate_program(
        &self,
        _profile: &StudentProfile,
        _policy: &LanguagePolicy,
    ) -> GenResult<ProgramBlueprint> {
        Err(GenError::NotConfigured {
            capability: "curriculum planner",
        })
    }
}

#[async_trait]
impl LessonPlanner for Unconfigured {
    async fn plan_lessons(
        &self,
        _profile: &StudentProfile,
        _module: &ModuleBlueprint,
        _count: usize,
        _policy: &LanguagePolicy,
    ) -> GenResult<Vec<LessonPlan>> {
        Err(GenError::NotConfigured {
            capability: "lesson planner",
        })
    }
}

#[async_trait]
impl ResourceCurator for Unconfigured {
    async fn find_resources(
        &self,
        _topic: &str,
        _lesson: &LessonPlan,
        _module_title: &str,
        _policy: &LanguagePolicy,
    ) -> GenResult<Vec<ResourceCandidate>> {
        Err(GenError::NotConfigured {
            capability: "resource curator",
        })
    }
}

#[async_trait]
impl LessonBuilder for Unconfigured {
    async fn build_notes(
        &self,
        _lesson: &LessonPlan,
        _resources: &[ResourceCandidate],
        _module_title: &str,
        _policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        Err(GenError::NotConfigured {
            capability: "lesson builder",
        })
    }

    async fn repair_notes(
        &self,
        _lesson: &LessonPlan,
        _notes: &LessonNotes,
        _policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        Err(GenError::NotConfigured {
            capability: "lesson builder",
        })
    }

    async fn refine_notes(
        &self,
        _lesson: &LessonPlan,
        _notes: &LessonNotes,
        _policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        Err(GenError::NotConfigured {
            capability: "lesson builder",
        })
    }
}

#[async_trait]
impl ExerciseGenerator for Unconfigured {
    async fn generate_exercise_set(
        &self,
        _lesson: &LessonPlan,
        _policy: &LanguagePolicy,
    ) -> GenResult<ExerciseSet> {
        Err(GenError::NotConfigured {
            capability: "exercise generator",
        })
    }
}

#[async_trait]
impl AssessmentGenerator for Unconfigured {
    async fn generate_quiz(
        &self,
        _module: &ModuleBlueprint,
        _question_count: usize,
        _policy: &LanguagePolicy,
    ) -> GenResult<Assessment> {
        Err(GenError::NotConfigured {
            capability: "assessment generator",
        })
    }

    async fn generate_final_exam(
        &self,
        _program_title: &str,
        _modules: &[ModuleBlueprint],
        _question_count: usize,
        _policy: &LanguagePolicy,
    ) -> GenResult<Assessment> {
        Err(GenError::NotConfigured {
            capability: "assessment generator",
        })
    }
}

/// A generator set with no providers attached.
pub fn unconfigured_generators() -> GeneratorSet {
    let provider = Arc::new(Unconfigured);
    GeneratorSet {
        planner: provider.clone(),
        lesson_planner: provider.clone(),
        curator: provider.clone(),
        builder: provider.clone(),
        exercises: provider.clone(),
        assessments: provider,
    }
}
