//! Scripted generator providers
//!
//! Deterministic implementations of the `syllab-gen` traits. The static set
//! produces a small fixed program shape from the profile topic; the failing
//! variants reject specific calls so tests can exercise fallback, retry and
//! partial-failure paths without any provider infrastructure.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use syllab_core::{
    GenError, LanguagePolicy, LessonPlan, ModuleBlueprint, ProgramBlueprint, StudentProfile,
};
use syllab_gen::{
    Assessment, AssessmentGenerator, CurriculumPlanner, ExerciseGenerator, ExerciseQuestion,
    ExerciseSet, GenResult, GeneratorSet, GlossaryEntry, GuidedSection, LessonBuilder,
    LessonNotes, LessonPlanner, ResourceCandidate, ResourceCurator,
};

/// Default program shape produced by [`StaticPlanner`].
pub const STATIC_MODULE_COUNT: usize = 3;
pub const STATIC_LESSONS_PER_MODULE: i32 = 2;

/// Call counters shared with the scripted providers, used to assert that a
/// resumed build does not redo already-committed work.
#[derive(Debug, Clone, Default)]
pub struct GenCounters {
    pub program_calls: Arc<AtomicUsize>,
    pub plan_lessons_calls: Arc<AtomicUsize>,
    pub notes_calls: Arc<AtomicUsize>,
    pub refine_calls: Arc<AtomicUsize>,
}

impl GenCounters {
    pub fn programs(&self) -> usize {
        self.program_calls.load(Ordering::SeqCst)
    }

    pub fn lesson_plans(&self) -> usize {
        self.plan_lessons_calls.load(Ordering::SeqCst)
    }

    pub fn notes(&self) -> usize {
        self.notes_calls.load(Ordering::SeqCst)
    }

    pub fn refines(&self) -> usize {
        self.refine_calls.load(Ordering::SeqCst)
    }
}

// ============================================================================
// STATIC PROVIDERS
// ============================================================================

pub struct StaticPlanner {
    pub module_count: usize,
    pub lessons_per_module: i32,
    counters: GenCounters,
}

#[async_trait]
impl CurriculumPlanner for StaticPlanner {
    async fn generate_program(
        &self,
        profile: &StudentProfile,
        _policy: &LanguagePolicy,
    ) -> GenResult<ProgramBlueprint> {
        self.counters.program_calls.fetch_add(1, Ordering::SeqCst);
        let modules: Vec<ModuleBlueprint> = (0..self.module_count)
            .map(|i| ModuleBlueprint {
                index: i as i32,
                title: format!("{} Module {}", profile.topic, i + 1),
                outcomes: vec![
                    format!("Understand {} part {}", profile.topic, i + 1),
                    format!("Apply {} part {}", profile.topic, i + 1),
                ],
                lessons_count: self.lessons_per_module,
                estimated_hours: self.lessons_per_module as f64,
            })
            .collect();
        let total_lessons = modules.iter().map(|m| m.lessons_count).sum();
        Ok(ProgramBlueprint {
            title: format!("{} Mastery Track", profile.topic),
            description: format!("A structured path through {}", profile.topic),
            modules,
            total_lessons,
            estimated_hours: total_lessons as f64,
        })
    }
}

pub struct StaticLessonPlanner {
    counters: GenCounters,
}

#[async_trait]
impl LessonPlanner for StaticLessonPlanner {
    async fn plan_lessons(
        &self,
        _profile: &StudentProfile,
        module: &ModuleBlueprint,
        count: usize,
        _policy: &LanguagePolicy,
    ) -> GenResult<Vec<LessonPlan>> {
        self.counters
            .plan_lessons_calls
            .fetch_add(1, Ordering::SeqCst);
        Ok((0..count)
            .map(|i| LessonPlan {
                title: format!("{} Lesson {}", module.title, i + 1),
                objectives: module.outcomes.clone(),
                estimated_minutes: 45,
            })
            .collect())
    }
}

pub struct StaticCurator;

#[async_trait]
impl ResourceCurator for StaticCurator {
    async fn find_resources(
        &self,
        topic: &str,
        lesson: &LessonPlan,
        _module_title: &str,
        _policy: &LanguagePolicy,
    ) -> GenResult<Vec<ResourceCandidate>> {
        Ok(vec![
            ResourceCandidate {
                resource_type: "article".to_string(),
                title: format!("Reading: {}", lesson.title),
                url: format!("https://example.test/{}", topic.to_lowercase()),
                duration_seconds: Some(600),
                reason: Some("matches the lesson objectives".to_string()),
                quality_score: Some(0.9),
            },
            ResourceCandidate {
                resource_type: "video".to_string(),
                title: format!("Video: {}", lesson.title),
                url: "https://example.test/video".to_string(),
                duration_seconds: Some(900),
                reason: None,
                quality_score: Some(0.7),
            },
        ])
    }
}

pub struct StaticBuilder {
    counters: GenCounters,
}

#[async_trait]
impl LessonBuilder for StaticBuilder {
    async fn build_notes(
        &self,
        lesson: &LessonPlan,
        _resources: &[ResourceCandidate],
        _module_title: &str,
        _policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        self.counters.notes_calls.fetch_add(1, Ordering::SeqCst);
        Ok(LessonNotes {
            summary: format!("Notes for {}", lesson.title),
            key_points: lesson.objectives.clone(),
            glossary: vec![GlossaryEntry {
                term: "term".to_string(),
                definition: "a scripted definition".to_string(),
            }],
            guided_notes: vec![GuidedSection {
                section: "Overview".to_string(),
                content: lesson.objectives.join("; "),
                questions: vec!["What did you learn?".to_string()],
            }],
        })
    }

    async fn repair_notes(
        &self,
        _lesson: &LessonPlan,
        notes: &LessonNotes,
        policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        let mut repaired = notes.clone();
        repaired.summary = policy.wrap(&notes.summary);
        Ok(repaired)
    }

    async fn refine_notes(
        &self,
        _lesson: &LessonPlan,
        notes: &LessonNotes,
        _policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        self.counters.refine_calls.fetch_add(1, Ordering::SeqCst);
        let mut refined = notes.clone();
        refined.summary = format!("{} (reviewed)", notes.summary);
        Ok(refined)
    }
}

pub struct StaticExercises;

#[async_trait]
impl ExerciseGenerator for StaticExercises {
    async fn generate_exercise_set(
        &self,
        lesson: &LessonPlan,
        _policy: &LanguagePolicy,
    ) -> GenResult<ExerciseSet> {
        Ok(ExerciseSet {
            title: format!("{} Practice", lesson.title),
            description: "Scripted practice set".to_string(),
            difficulty: "intermediate".to_string(),
            estimated_minutes: 30,
            questions: vec![question("Explain the main idea"), question("Give an example")],
            instructions: None,
        })
    }
}

pub struct StaticAssessments;

#[async_trait]
impl AssessmentGenerator for StaticAssessments {
    async fn generate_quiz(
        &self,
        module: &ModuleBlueprint,
        question_count: usize,
        _policy: &LanguagePolicy,
    ) -> GenResult<Assessment> {
        Ok(Assessment {
            title: format!("{} Quiz", module.title),
            questions: (0..question_count)
                .map(|i| question(&format!("Question {} on {}", i + 1, module.title)))
                .collect(),
            rubric: None,
            passing_score: 70,
            time_limit_minutes: Some(20),
        })
    }

    async fn generate_final_exam(
        &self,
        program_title: &str,
        _modules: &[ModuleBlueprint],
        question_count: usize,
        _policy: &LanguagePolicy,
    ) -> GenResult<Assessment> {
        Ok(Assessment {
            title: format!("{} Final Exam", program_title),
            questions: (0..question_count)
                .map(|i| question(&format!("Exam question {}", i + 1)))
                .collect(),
            rubric: None,
            passing_score: 70,
            time_limit_minutes: Some(90),
        })
    }
}

fn question(prompt: &str) -> ExerciseQuestion {
    ExerciseQuestion {
        prompt: prompt.to_string(),
        kind: "open".to_string(),
        options: Vec::new(),
        answer: None,
        explanation: None,
    }
}

// ============================================================================
// FAILING PROVIDERS
// ============================================================================

pub struct FailingPlanner;

#[async_trait]
impl CurriculumPlanner for FailingPlanner {
    async fn generate_program(
        &self,
        _profile: &StudentProfile,
        _policy: &LanguagePolicy,
    ) -> GenResult<ProgramBlueprint> {
        Err(GenError::RequestFailed {
            reason: "scripted planner failure".to_string(),
        })
    }
}

pub struct FailingBuilder;

#[async_trait]
impl LessonBuilder for FailingBuilder {
    async fn build_notes(
        &self,
        _lesson: &LessonPlan,
        _resources: &[ResourceCandidate],
        _module_title: &str,
        _policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        Err(GenError::RequestFailed {
            reason: "scripted builder failure".to_string(),
        })
    }

    async fn repair_notes(
        &self,
        _lesson: &LessonPlan,
        _notes: &LessonNotes,
        _policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        Err(GenError::RequestFailed {
            reason: "scripted repair failure".to_string(),
        })
    }

    async fn refine_notes(
        &self,
        _lesson: &LessonPlan,
        _notes: &LessonNotes,
        _policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        Err(GenError::RequestFailed {
            reason: "scripted review failure".to_string(),
        })
    }
}

/// Builder whose drafts are conspicuously English regardless of the target
/// language, triggering the one-shot repair under a strict policy. The
/// repair tags the summary via [`LanguagePolicy::wrap`].
pub struct EnglishOnlyBuilder;

#[async_trait]
impl LessonBuilder for EnglishOnlyBuilder {
    async fn build_notes(
        &self,
        lesson: &LessonPlan,
        _resources: &[ResourceCandidate],
        _module_title: &str,
        _policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        Ok(LessonNotes {
            summary: format!(
                "This is the summary of the lesson and it is written in English for you: {}",
                lesson.title
            ),
            key_points: vec![
                "This is the first point that you should remember".to_string(),
                "This is the second point and it matters more than the first".to_string(),
            ],
            glossary: Vec::new(),
            guided_notes: Vec::new(),
        })
    }

    async fn repair_notes(
        &self,
        _lesson: &LessonPlan,
        notes: &LessonNotes,
        policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        let mut repaired = notes.clone();
        repaired.summary = policy.wrap(&notes.summary);
        Ok(repaired)
    }

    async fn refine_notes(
        &self,
        _lesson: &LessonPlan,
        notes: &LessonNotes,
        _policy: &LanguagePolicy,
    ) -> GenResult<LessonNotes> {
        Ok(notes.clone())
    }
}

pub struct FailingAssessments;

#[async_trait]
impl AssessmentGenerator for FailingAssessments {
    async fn generate_quiz(
        &self,
        _module: &ModuleBlueprint,
        _question_count: usize,
        _policy: &LanguagePolicy,
    ) -> GenResult<Assessment> {
        Err(GenError::InvalidContent {
            reason: "scripted quiz failure".to_string(),
        })
    }

    async fn generate_final_exam(
        &self,
        _program_title: &str,
        _modules: &[ModuleBlueprint],
        _question_count: usize,
        _policy: &LanguagePolicy,
    ) -> GenResult<Assessment> {
        Err(GenError::InvalidContent {
            reason: "scripted exam failure".to_string(),
        })
    }
}

// ============================================================================
// BUNDLES
// ============================================================================

fn static_set(counters: GenCounters) -> GeneratorSet {
    GeneratorSet {
        planner: Arc::new(StaticPlanner {
            module_count: STATIC_MODULE_COUNT,
            lessons_per_module: STATIC_LESSONS_PER_MODULE,
            counters: counters.clone(),
        }),
        lesson_planner: Arc::new(StaticLessonPlanner {
            counters: counters.clone(),
        }),
        curator: Arc::new(StaticCurator),
        builder: Arc::new(StaticBuilder { counters }),
        exercises: Arc::new(StaticExercises),
        assessments: Arc::new(StaticAssessments),
    }
}

/// Fully scripted happy-path generator bundle.
pub fn happy_generators() -> GeneratorSet {
    static_set(GenCounters::default())
}

/// Happy-path bundle plus shared call counters.
pub fn counting_generators() -> (GeneratorSet, GenCounters) {
    let counters = GenCounters::default();
    (static_set(counters.clone()), counters)
}

/// Happy-path bundle whose planner always fails; the plan phase has no
/// fallback, so builds fail at job level.
pub fn generators_with_failing_planner() -> GeneratorSet {
    let mut set = happy_generators();
    set.planner = Arc::new(FailingPlanner);
    set
}

/// Happy-path bundle whose lesson builder always fails; lessons complete
/// with fallback notes.
pub fn generators_with_failing_notes() -> GeneratorSet {
    let mut set = happy_generators();
    set.builder = Arc::new(FailingBuilder);
    set
}

/// Happy-path bundle whose quiz and exam generation always fails; fallback
/// assessments are stored instead.
pub fn generators_with_failing_assessments() -> GeneratorSet {
    let mut set = happy_generators();
    set.assessments = Arc::new(FailingAssessments);
    set
}

/// Happy-path bundle whose lesson drafts are English no matter the target
/// language. Under a strict non-English policy the pipeline repairs them
/// once, which tags the summary with the expected language.
pub fn generators_with_english_notes() -> GeneratorSet {
    let mut set = happy_generators();
    set.builder = Arc::new(EnglishOnlyBuilder);
    set
}
