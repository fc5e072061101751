//! SYLLAB Test Utilities
//!
//! Centralized test infrastructure for the SYLLAB workspace:
//! - Scripted generator providers (deterministic content, no model calls)
//! - Failure-injecting generator and store variants
//! - Profile fixtures for common scenarios

pub mod generators;
pub mod profiles;
pub mod store;

pub use generators::{
    counting_generators, generators_with_english_notes, generators_with_failing_assessments,
    generators_with_failing_notes, generators_with_failing_planner, happy_generators, GenCounters,
};
pub use profiles::{english_profile, german_strict_profile};
pub use store::FlakyStore;
