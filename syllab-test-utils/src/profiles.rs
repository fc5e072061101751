//! Profile fixtures.

use syllab_core::StudentProfile;

/// Plain English learner profile, two hours a day.
pub fn english_profile() -> StudentProfile {
    StudentProfile {
        topic: "Rust".to_string(),
        current_level: "beginner".to_string(),
        goal_level: "intermediate".to_string(),
        target_date: "2026-12-31".to_string(),
        hours_per_day: 2.0,
        content_language: "English".to_string(),
        instruction_language: "English".to_string(),
        strict_target_language: false,
    }
}

/// Strict German-content profile. Content produced by the scripted
/// generators stays English, so compliance checks fire against it.
pub fn german_strict_profile() -> StudentProfile {
    StudentProfile {
        topic: "Rust".to_string(),
        current_level: "beginner".to_string(),
        goal_level: "advanced".to_string(),
        target_date: "2026-12-31".to_string(),
        hours_per_day: 1.5,
        content_language: "German".to_string(),
        instruction_language: "English".to_string(),
        strict_target_language: true,
    }
}
