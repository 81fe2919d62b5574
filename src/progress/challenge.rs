use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::progress::catalog::{Exercise, ExerciseKind, LevelCatalog};

/// Kinds that can appear in an ad-hoc challenge list.
pub const CHALLENGE_KINDS: &[ExerciseKind] = &[
    ExerciseKind::MultipleChoice,
    ExerciseKind::FillBlank,
    ExerciseKind::Translation,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub difficulty: String,
    pub time_limit_secs: Option<i64>,
    pub question_count: usize,
    pub required_accuracy: Option<u32>,
    pub heart_reward: u32,
    pub xp_reward: u64,
}

#[allow(clippy::too_many_arguments)]
fn challenge(
    id: &str,
    name: &str,
    description: &str,
    difficulty: &str,
    time_limit_secs: Option<i64>,
    question_count: usize,
    required_accuracy: Option<u32>,
    heart_reward: u32,
    xp_reward: u64,
) -> ChallengeDefinition {
    ChallengeDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        difficulty: difficulty.to_string(),
        time_limit_secs,
        question_count,
        required_accuracy,
        heart_reward,
        xp_reward,
    }
}

pub static BUILTIN_CHALLENGES: Lazy<Vec<ChallengeDefinition>> = Lazy::new(|| {
    vec![
        challenge("speed", "Desafío de Velocidad", "Responde 10 preguntas en 60 segundos", "Fácil", Some(60), 10, None, 2, 20),
        challenge("accuracy", "Desafío de Precisión", "Responde 15 preguntas con 100% de precisión", "Intermedio", None, 15, Some(100), 3, 30),
        challenge("endurance", "Desafío de Resistencia", "Responde 25 preguntas seguidas", "Difícil", None, 25, None, 5, 50),
        challenge("daily", "Desafío Diario", "Responde 5 preguntas variadas hoy", "Fácil", None, 5, None, 1, 15),
        challenge("grammar", "Desafío de Gramática", "Responde 20 preguntas de gramática", "Intermedio", None, 20, None, 4, 40),
        challenge("vocabulary", "Desafío de Vocabulario", "Responde 18 preguntas de vocabulario", "Intermedio", None, 18, None, 3, 35),
    ]
});

pub fn find_challenge(id: &str) -> Option<&'static ChallengeDefinition> {
    BUILTIN_CHALLENGES.iter().find(|c| c.id == id)
}

/// Draws `count` exercises at random from the challenge-eligible pool,
/// reshuffling and repeating the pool when it is smaller than `count`.
pub fn build_question_list<R: Rng + ?Sized>(
    catalog: &LevelCatalog,
    count: usize,
    rng: &mut R,
) -> Vec<Exercise> {
    let pool = catalog.exercises_of_kinds(CHALLENGE_KINDS);
    if pool.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let mut round: Vec<&Exercise> = pool.clone();
        round.shuffle(rng);
        out.extend(
            round
                .into_iter()
                .take(count - out.len())
                .cloned(),
        );
    }
    out
}
