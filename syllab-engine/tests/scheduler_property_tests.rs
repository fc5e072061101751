//! Property tests for the deterministic scheduler.

use proptest::prelude::*;
use syllab_core::{new_entity_id, EntityId, ScheduleItemType};
use syllab_engine::scheduler::{
    build_schedule, minutes_per_day, LessonSlot, MAX_LESSON_MINUTES, MIN_LESSON_MINUTES,
    REVIEW_EVERY_N_LESSONS,
};
use syllab_store::ScheduleItemInput;

fn arb_lessons() -> impl Strategy<Value = Vec<LessonSlot>> {
    prop::collection::vec(1..240i32, 0..40).prop_map(|minutes| {
        minutes
            .into_iter()
            .map(|estimated_minutes| LessonSlot {
                id: new_entity_id(),
                estimated_minutes,
            })
            .collect()
    })
}

fn arb_quizzes() -> impl Strategy<Value = Vec<EntityId>> {
    (0..6usize).prop_map(|n| (0..n).map(|_| new_entity_id()).collect())
}

fn per_day_totals(items: &[ScheduleItemInput]) -> Vec<(i32, i32, usize)> {
    let mut totals: Vec<(i32, i32, usize)> = Vec::new();
    for item in items {
        match totals.last_mut() {
            Some((day, minutes, count)) if *day == item.day_offset => {
                *minutes += item.estimated_minutes;
                *count += 1;
            }
            _ => totals.push((item.day_offset, item.estimated_minutes, 1)),
        }
    }
    totals
}

proptest! {
    #[test]
    fn prop_every_unit_is_placed(
        hours in 0.5f64..12.0,
        lessons in arb_lessons(),
        quizzes in arb_quizzes(),
        has_exam in any::<bool>(),
    ) {
        let exam = has_exam.then(new_entity_id);
        let items = build_schedule(hours, &lessons, &quizzes, exam);

        let expected = lessons.len() * 2
            + lessons.len() / REVIEW_EVERY_N_LESSONS
            + quizzes.len()
            + usize::from(exam.is_some());
        prop_assert_eq!(items.len(), expected);

        let placed_lessons = items
            .iter()
            .filter(|i| i.item_type == ScheduleItemType::Lesson)
            .count();
        prop_assert_eq!(placed_lessons, lessons.len());
    }

    #[test]
    fn prop_days_never_overflow_except_lone_oversized_units(
        hours in 0.5f64..12.0,
        lessons in arb_lessons(),
        quizzes in arb_quizzes(),
        has_exam in any::<bool>(),
    ) {
        let exam = has_exam.then(new_entity_id);
        let budget = minutes_per_day(hours);
        let items = build_schedule(hours, &lessons, &quizzes, exam);

        // Day offsets advance monotonically, one at a time.
        for pair in items.windows(2) {
            prop_assert!(pair[1].day_offset >= pair[0].day_offset);
            prop_assert!(pair[1].day_offset - pair[0].day_offset <= 1);
        }

        // A day only exceeds the budget when a single oversized unit owns
        // it outright.
        for (day, minutes, count) in per_day_totals(&items) {
            if count > 1 {
                prop_assert!(
                    minutes <= budget,
                    "day {} holds {} minutes over budget {}",
                    day, minutes, budget
                );
            }
        }
    }

    #[test]
    fn prop_lesson_minutes_are_clamped(
        hours in 0.5f64..12.0,
        lessons in arb_lessons(),
    ) {
        let items = build_schedule(hours, &lessons, &[], None);
        for item in items.iter().filter(|i| i.item_type == ScheduleItemType::Lesson) {
            prop_assert!(item.estimated_minutes >= MIN_LESSON_MINUTES);
            prop_assert!(item.estimated_minutes <= MAX_LESSON_MINUTES);
        }
    }

    #[test]
    fn prop_schedule_is_deterministic(
        hours in 0.5f64..12.0,
        lessons in arb_lessons(),
        quizzes in arb_quizzes(),
        has_exam in any::<bool>(),
    ) {
        let exam = has_exam.then(new_entity_id);
        let first = build_schedule(hours, &lessons, &quizzes, exam);
        let second = build_schedule(hours, &lessons, &quizzes, exam);
        prop_assert_eq!(first, second);
    }
}
