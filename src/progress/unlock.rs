use std::collections::BTreeSet;

use crate::progress::catalog::LevelCatalog;

/// Lesson 1 is always open. Lesson n opens once n-1 is completed and the
/// learner holds at least the hearts lesson n requires.
pub fn is_unlocked(
    lesson_id: u32,
    completed_lessons: &BTreeSet<u32>,
    current_hearts: u32,
    catalog: &LevelCatalog,
) -> bool {
    match lesson_id {
        0 => false,
        1 => true,
        n => {
            completed_lessons.contains(&(n - 1)) && current_hearts >= catalog.hearts_required(n)
        }
    }
}
