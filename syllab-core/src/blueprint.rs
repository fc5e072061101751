//! Blueprint and profile types
//!
//! A blueprint is the planned structure of a program (modules, outcomes,
//! lesson counts) before individual lesson content exists. Normalization
//! caps the planner's output so total work stays bounded.

use serde::{Deserialize, Serialize};

/// Upper bound on modules per program.
pub const MAX_MODULES: usize = 6;
/// Upper bound on lessons per module.
pub const MAX_LESSONS_PER_MODULE: usize = 12;
/// Upper bound on outcomes kept per module.
pub const MAX_OUTCOMES_PER_MODULE: usize = 6;

// ============================================================================
// PROFILE
// ============================================================================

/// Onboarding profile a build is requested with. Serialized onto the job row
/// so a resume sees exactly the inputs of the original request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub topic: String,
    pub current_level: String,
    pub goal_level: String,
    /// ISO date the learner wants to be done by.
    pub target_date: String,
    pub hours_per_day: f64,
    pub content_language: String,
    pub instruction_language: String,
    pub strict_target_language: bool,
}

// ============================================================================
// BLUEPRINT
// ============================================================================

/// Planned structure of a whole program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramBlueprint {
    pub title: String,
    pub description: String,
    pub modules: Vec<ModuleBlueprint>,
    pub total_lessons: i32,
    pub estimated_hours: f64,
}

/// Planned structure of one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleBlueprint {
    pub index: i32,
    pub title: String,
    pub outcomes: Vec<String>,
    pub lessons_count: i32,
    pub estimated_hours: f64,
}

/// Planned shape of one lesson before its content is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonPlan {
    pub title: String,
    pub objectives: Vec<String>,
    pub estimated_minutes: i32,
}

impl ProgramBlueprint {
    /// Cap module count, lessons per module, and outcomes per module to the
    /// fixed upper bounds, reindexing modules so indexes stay dense.
    pub fn normalized(mut self) -> Self {
        self.modules.truncate(MAX_MODULES);
        for (index, module) in self.modules.iter_mut().enumerate() {
            module.index = index as i32;
            module.lessons_count = module
                .lessons_count
                .clamp(1, MAX_LESSONS_PER_MODULE as i32);
            module.outcomes.truncate(MAX_OUTCOMES_PER_MODULE);
        }
        self.total_lessons = self.modules.iter().map(|m| m.lessons_count).sum();
        self.estimated_hours = self.modules.iter().map(|m| m.estimated_hours).sum();
        self
    }
}

impl ModuleBlueprint {
    /// Fallback lesson plan derived from the module's own outcomes, used
    /// when the lesson planner fails or returns too few entries.
    pub fn fallback_lesson_plan(&self, index: usize) -> LessonPlan {
        LessonPlan {
            title: format!("Lesson {}: {}", index + 1, self.title),
            objectives: self.outcomes.iter().take(3).cloned().collect(),
            estimated_minutes: 45,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(index: i32, lessons: i32) -> ModuleBlueprint {
        ModuleBlueprint {
            index,
            title: format!("Module {index}"),
            outcomes: (0..10).map(|i| format!("outcome {i}")).collect(),
            lessons_count: lessons,
            estimated_hours: 4.0,
        }
    }

    #[test]
    fn test_normalized_caps_modules_and_lessons() {
        let blueprint = ProgramBlueprint {
            title: "Rust".to_string(),
            description: "Learn Rust".to_string(),
            modules: (0..9).map(|i| module(i, 40)).collect(),
            total_lessons: 0,
            estimated_hours: 0.0,
        };

        let normalized = blueprint.normalized();
        assert_eq!(normalized.modules.len(), MAX_MODULES);
        for (i, m) in normalized.modules.iter().enumerate() {
            assert_eq!(m.index, i as i32);
            assert_eq!(m.lessons_count, MAX_LESSONS_PER_MODULE as i32);
            assert_eq!(m.outcomes.len(), MAX_OUTCOMES_PER_MODULE);
        }
        assert_eq!(
            normalized.total_lessons,
            (MAX_MODULES * MAX_LESSONS_PER_MODULE) as i32
        );
    }

    #[test]
    fn test_normalized_lower_bound_on_lessons() {
        let blueprint = ProgramBlueprint {
            title: "t".to_string(),
            description: "d".to_string(),
            modules: vec![module(0, 0)],
            total_lessons: 0,
            estimated_hours: 0.0,
        };
        assert_eq!(blueprint.normalized().modules[0].lessons_count, 1);
    }

    #[test]
    fn test_fallback_lesson_plan() {
        let m = module(0, 3);
        let plan = m.fallback_lesson_plan(4);
        assert_eq!(plan.title, "Lesson 5: Module 0");
        assert_eq!(plan.objectives.len(), 3);
        assert_eq!(plan.estimated_minutes, 45);
    }
}
