//! Deterministic fallback artifacts
//!
//! When a generator call fails, the lesson or assessment still gets a
//! well-formed placeholder so the build can finish. Fallbacks are built
//! entirely from data already on hand and respect the language policy via
//! [`LanguagePolicy::wrap`].

use syllab_core::{LanguagePolicy, LessonPlan, ModuleBlueprint};
use syllab_gen::{Assessment, ExerciseSet, GuidedSection, LessonNotes};

/// Templated notes derived from the lesson's own objectives.
pub fn fallback_notes(lesson: &LessonPlan, policy: &LanguagePolicy) -> LessonNotes {
    let summary = policy.wrap(&format!(
        "{}. This lesson covers: {}.",
        lesson.title,
        lesson.objectives.join("; ")
    ));
    let guided_notes = lesson
        .objectives
        .iter()
        .map(|objective| GuidedSection {
            section: policy.wrap(objective),
            content: policy.wrap(&format!(
                "Work through \"{objective}\" using the listed resources, then summarize it in your own words."
            )),
            questions: vec![policy.wrap(&format!("What did you learn about: {objective}?"))],
        })
        .collect();

    LessonNotes {
        summary,
        key_points: lesson.objectives.iter().map(|o| policy.wrap(o)).collect(),
        glossary: Vec::new(),
        guided_notes,
    }
}

/// Empty placeholder practice set for a lesson.
pub fn fallback_exercise_set(lesson: &LessonPlan, policy: &LanguagePolicy) -> ExerciseSet {
    ExerciseSet {
        title: policy.wrap(&format!("{} Practice", lesson.title)),
        description: policy.wrap("Placeholder practice set."),
        difficulty: "intermediate".to_string(),
        estimated_minutes: 30,
        questions: Vec::new(),
        instructions: Some(policy.wrap(
            "Practice content could not be generated. Retry the build to regenerate this set.",
        )),
    }
}

/// Empty placeholder quiz for a module.
pub fn fallback_quiz(module: &ModuleBlueprint) -> Assessment {
    Assessment {
        title: format!("{} Quiz (Fallback)", module.title),
        questions: Vec::new(),
        rubric: None,
        passing_score: 70,
        time_limit_minutes: Some(20),
    }
}

/// Empty placeholder final exam.
pub fn fallback_exam() -> Assessment {
    Assessment {
        title: "Final Exam (Fallback)".to_string(),
        questions: Vec::new(),
        rubric: None,
        passing_score: 70,
        time_limit_minutes: Some(90),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson() -> LessonPlan {
        LessonPlan {
            title: "Ownership".to_string(),
            objectives: vec!["Moves".to_string(), "Borrows".to_string()],
            estimated_minutes: 45,
        }
    }

    #[test]
    fn test_fallback_notes_use_objectives() {
        let policy = LanguagePolicy::resolve("English", "English", true);
        let notes = fallback_notes(&lesson(), &policy);
        assert!(notes.summary.contains("Moves; Borrows"));
        assert_eq!(notes.key_points, vec!["Moves", "Borrows"]);
        assert_eq!(notes.guided_notes.len(), 2);
        assert!(notes.glossary.is_empty());
    }

    #[test]
    fn test_fallback_notes_tag_non_english() {
        let policy = LanguagePolicy::resolve("German", "English", true);
        let notes = fallback_notes(&lesson(), &policy);
        assert!(notes.summary.starts_with("[German] "));
        assert!(notes.key_points.iter().all(|p| p.starts_with("[German] ")));
    }

    #[test]
    fn test_fallback_exercise_set_is_empty_but_formed() {
        let policy = LanguagePolicy::resolve("English", "English", true);
        let set = fallback_exercise_set(&lesson(), &policy);
        assert!(set.questions.is_empty());
        assert_eq!(set.title, "Ownership Practice");
        assert!(set.instructions.is_some());
    }

    #[test]
    fn test_fallback_assessments_flagged_in_title() {
        let module = ModuleBlueprint {
            index: 0,
            title: "Basics".to_string(),
            outcomes: vec![],
            lessons_count: 3,
            estimated_hours: 6.0,
        };
        assert_eq!(fallback_quiz(&module).title, "Basics Quiz (Fallback)");
        assert_eq!(fallback_exam().title, "Final Exam (Fallback)");
        assert!(fallback_quiz(&module).questions.is_empty());
    }
}
