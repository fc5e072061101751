//! Deterministic schedule builder
//!
//! A pure bin-packing pass over the program's placement units. No generator
//! calls, no randomness: the same inputs always produce the same calendar,
//! so a retried build overwrites the schedule with an identical one.
//!
//! Order of placement: each lesson followed by its 30-minute exercise
//! block, a 35-minute review block after every 4th lesson, then module
//! quizzes in module order, then the final exam.

use syllab_core::{EntityId, ScheduleItemType};
use syllab_store::ScheduleItemInput;

pub const MIN_MINUTES_PER_DAY: i32 = 60;
pub const MAX_MINUTES_PER_DAY: i32 = 600;
pub const MIN_LESSON_MINUTES: i32 = 25;
pub const MAX_LESSON_MINUTES: i32 = 120;
pub const EXERCISE_MINUTES: i32 = 30;
pub const REVIEW_MINUTES: i32 = 35;
pub const REVIEW_EVERY_N_LESSONS: usize = 4;
pub const QUIZ_MINUTES: i32 = 30;
pub const EXAM_MINUTES: i32 = 90;

/// One lesson to place, in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonSlot {
    pub id: EntityId,
    pub estimated_minutes: i32,
}

/// Daily study budget in minutes, clamped to [60, 600].
pub fn minutes_per_day(hours_per_day: f64) -> i32 {
    ((hours_per_day * 60.0) as i32).clamp(MIN_MINUTES_PER_DAY, MAX_MINUTES_PER_DAY)
}

struct DayCursor {
    budget: i32,
    day_offset: i32,
    minutes_used: i32,
    items: Vec<ScheduleItemInput>,
}

impl DayCursor {
    fn new(budget: i32) -> Self {
        Self {
            budget,
            day_offset: 0,
            minutes_used: 0,
            items: Vec::new(),
        }
    }

    // A unit that does not fit in the remainder of the day starts the next
    // day. The advance is unconditional, so a unit larger than the whole
    // budget opens a fresh day, overflows it alone, and the next unit moves
    // on again.
    fn push(&mut self, item_type: ScheduleItemType, ref_id: Option<EntityId>, minutes: i32) {
        if self.minutes_used + minutes > self.budget {
            self.day_offset += 1;
            self.minutes_used = 0;
        }
        self.items.push(ScheduleItemInput {
            day_offset: self.day_offset,
            item_type,
            ref_id,
            estimated_minutes: minutes,
        });
        self.minutes_used += minutes;
    }
}

/// Place every unit of the program onto a day grid.
pub fn build_schedule(
    hours_per_day: f64,
    lessons: &[LessonSlot],
    quizzes: &[EntityId],
    exam: Option<EntityId>,
) -> Vec<ScheduleItemInput> {
    let mut cursor = DayCursor::new(minutes_per_day(hours_per_day));

    for (i, lesson) in lessons.iter().enumerate() {
        cursor.push(
            ScheduleItemType::Lesson,
            Some(lesson.id),
            lesson
                .estimated_minutes
                .clamp(MIN_LESSON_MINUTES, MAX_LESSON_MINUTES),
        );
        cursor.push(ScheduleItemType::Exercise, Some(lesson.id), EXERCISE_MINUTES);

        if (i + 1) % REVIEW_EVERY_N_LESSONS == 0 {
            cursor.push(ScheduleItemType::Review, None, REVIEW_MINUTES);
        }
    }

    for quiz_id in quizzes {
        cursor.push(ScheduleItemType::Quiz, Some(*quiz_id), QUIZ_MINUTES);
    }

    if let Some(exam_id) = exam {
        cursor.push(ScheduleItemType::Exam, Some(exam_id), EXAM_MINUTES);
    }

    cursor.items
}

#[cfg(test)]
mod tests {
    use super::*;
    use syllab_core::new_entity_id;

    fn slots(minutes: &[i32]) -> Vec<LessonSlot> {
        minutes
            .iter()
            .map(|m| LessonSlot {
                id: new_entity_id(),
                estimated_minutes: *m,
            })
            .collect()
    }

    #[test]
    fn test_minutes_per_day_clamped() {
        assert_eq!(minutes_per_day(0.5), 60);
        assert_eq!(minutes_per_day(2.0), 120);
        assert_eq!(minutes_per_day(16.0), 600);
    }

    #[test]
    fn test_two_hour_day_fills_before_rolling_over() {
        // 120-minute budget, 45-minute lessons. Day 0 takes the first pair
        // plus the second lesson (75 + 45 = 120, an exact fit); its exercise
        // rolls over and the third pair finishes day 1.
        let items = build_schedule(2.0, &slots(&[45, 45, 45]), &[], None);
        let days: Vec<i32> = items.iter().map(|i| i.day_offset).collect();
        assert_eq!(days, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_review_after_every_fourth_lesson() {
        let items = build_schedule(10.0, &slots(&[30; 8]), &[], None);
        let reviews: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.item_type == ScheduleItemType::Review)
            .map(|(pos, _)| pos)
            .collect();
        // After lessons 4 and 8, i.e. after the 8th and 17th unit.
        assert_eq!(reviews, vec![8, 17]);
    }

    #[test]
    fn test_quizzes_then_exam_close_the_plan() {
        let quiz = new_entity_id();
        let exam = new_entity_id();
        let items = build_schedule(2.0, &slots(&[45]), &[quiz], Some(exam));
        let tail: Vec<ScheduleItemType> =
            items.iter().rev().take(2).map(|i| i.item_type).collect();
        assert_eq!(tail, vec![ScheduleItemType::Exam, ScheduleItemType::Quiz]);
        assert_eq!(items.last().unwrap().ref_id, Some(exam));
        assert_eq!(items.last().unwrap().estimated_minutes, EXAM_MINUTES);
    }

    #[test]
    fn test_oversized_unit_gets_its_own_day() {
        // 60-minute budget, 120-minute lesson (already at the clamp cap).
        // The advance fires even on the empty first day, so the lesson
        // overflows day 1 alone and the exercise moves to day 2.
        let items = build_schedule(1.0, &slots(&[300]), &[], None);
        assert_eq!(items[0].estimated_minutes, MAX_LESSON_MINUTES);
        assert_eq!(items[0].day_offset, 1);
        assert_eq!(items[1].day_offset, 2);
    }

    #[test]
    fn test_lesson_minutes_clamped_low() {
        let items = build_schedule(2.0, &slots(&[5]), &[], None);
        assert_eq!(items[0].estimated_minutes, MIN_LESSON_MINUTES);
    }
}
