use std::collections::BTreeSet;

use serde_json::{json, Value};

use lingo_progress::progress::catalog::{AnswerRule, LevelCatalog};
use lingo_progress::progress::session::AnswerInput;
use lingo_progress::store::operations::profile::LearnerProfile;
use lingo_progress::store::Store;

/// Input that scores as correct for `rule`.
pub fn correct_input(rule: &AnswerRule) -> AnswerInput {
    match rule {
        AnswerRule::Exact { target }
        | AnswerRule::Normalized { target }
        | AnswerRule::NormalizedAny { target, .. } => AnswerInput::Text {
            value: target.clone(),
        },
        AnswerRule::Sequence { target, .. } => AnswerInput::Tokens {
            tokens: target.split(' ').map(str::to_string).collect(),
        },
        AnswerRule::Pairs { pairs } => AnswerInput::Pairs {
            pairs: pairs.clone(),
        },
    }
}

/// Input of the right shape that scores as incorrect.
pub fn wrong_input(rule: &AnswerRule) -> AnswerInput {
    match rule {
        AnswerRule::Sequence { .. } => AnswerInput::Tokens {
            tokens: vec!["zzz".to_string()],
        },
        AnswerRule::Pairs { .. } => AnswerInput::Pairs { pairs: Vec::new() },
        _ => AnswerInput::Text {
            value: "zzz-not-an-answer".to_string(),
        },
    }
}

pub fn answers_for_lesson(catalog: &LevelCatalog, lesson_id: u32, correct: usize) -> Vec<AnswerInput> {
    let lesson = catalog.get(lesson_id).expect("lesson in catalog");
    lesson
        .exercises
        .iter()
        .enumerate()
        .map(|(i, ex)| {
            if i < correct {
                correct_input(&ex.rule)
            } else {
                wrong_input(&ex.rule)
            }
        })
        .collect()
}

pub fn as_json(input: &AnswerInput) -> Value {
    serde_json::to_value(input).unwrap_or_else(|_| json!({}))
}

/// Seeds the canonical profile directly.
pub fn seed_profile(store: &Store, edit: impl FnOnce(&mut LearnerProfile)) -> LearnerProfile {
    let mut profile = store.load_profile(5).expect("load profile");
    edit(&mut profile);
    store.save_profile(&profile).expect("save profile");
    profile
}

pub fn lessons(ids: &[u32]) -> BTreeSet<u32> {
    ids.iter().copied().collect()
}
