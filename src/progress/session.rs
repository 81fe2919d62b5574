use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::progress::catalog::{AnswerRule, Exercise, ExerciseKind, VerbPair};
use crate::progress::rewards::{accuracy_percent, min_correct_to_pass};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session already completed")]
    AlreadyCompleted,
    #[error("answer does not fit a {} exercise", .0.as_str())]
    InputMismatch(ExerciseKind),
    #[error("time limit exceeded")]
    Expired,
}

/// Learner input, shaped by exercise kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerInput {
    Text { value: String },
    Tokens { tokens: Vec<String> },
    Pairs { pairs: Vec<VerbPair> },
}

impl AnswerInput {
    fn display(&self) -> String {
        match self {
            Self::Text { value } => value.clone(),
            Self::Tokens { tokens } => tokens.join(" "),
            Self::Pairs { pairs } => pairs
                .iter()
                .map(|p| format!("{} → {}", p.present, p.past))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Judges one answer. Input of the wrong shape is an error, not a wrong answer.
pub fn is_correct(
    kind: ExerciseKind,
    rule: &AnswerRule,
    input: &AnswerInput,
) -> Result<bool, SessionError> {
    let normalize = |s: &str| s.trim().to_lowercase();

    match (rule, input) {
        (AnswerRule::Exact { target }, AnswerInput::Text { value }) => Ok(value == target),
        (AnswerRule::Normalized { target }, AnswerInput::Text { value }) => {
            Ok(normalize(value) == target.to_lowercase())
        }
        (
            AnswerRule::NormalizedAny {
                target,
                alternatives,
            },
            AnswerInput::Text { value },
        ) => {
            let given = normalize(value);
            Ok(given == target.to_lowercase()
                || alternatives.iter().any(|alt| given == alt.to_lowercase()))
        }
        (AnswerRule::Sequence { target, .. }, AnswerInput::Tokens { tokens }) => {
            Ok(tokens.join(" ") == *target)
        }
        (AnswerRule::Pairs { pairs: expected }, AnswerInput::Pairs { pairs: given }) => {
            let key = |p: &VerbPair| (p.present.clone(), p.past.clone());
            let mut expected: Vec<_> = expected.iter().map(key).collect();
            let mut given: Vec<_> = given.iter().map(key).collect();
            expected.sort();
            given.sort();
            Ok(expected == given)
        }
        _ => Err(SessionError::InputMismatch(kind)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionSource {
    Lesson {
        lesson_id: u32,
        xp_reward: u64,
    },
    Challenge {
        challenge_id: String,
        required_accuracy: Option<u32>,
        heart_reward: u32,
        xp_reward: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionState {
    InProgress { current_index: usize },
    Completed { passed: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub prompt: String,
    pub expected: String,
    pub given: String,
    pub was_correct: bool,
    pub elapsed_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub correct: bool,
    pub expected: String,
    pub explanation: Option<String>,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total: usize,
    pub answered: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub min_required: usize,
    pub timed_out: bool,
    pub passed: Option<bool>,
}

/// Client-facing rendering of the current exercise. Answer data is withheld.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseView {
    pub index: usize,
    pub kind: ExerciseKind,
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub word_bank: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub present_forms: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub past_forms: Vec<String>,
}

impl ExerciseView {
    fn build<R: Rng + ?Sized>(index: usize, exercise: &Exercise, rng: &mut R) -> Self {
        let mut view = Self {
            index,
            kind: exercise.kind,
            prompt: exercise.prompt.clone(),
            options: exercise.options.clone(),
            audio: exercise.audio.clone(),
            word_bank: Vec::new(),
            present_forms: Vec::new(),
            past_forms: Vec::new(),
        };
        match &exercise.rule {
            AnswerRule::Sequence { tokens, .. } => {
                view.word_bank = tokens.clone();
                view.word_bank.shuffle(rng);
            }
            AnswerRule::Pairs { pairs } => {
                view.present_forms = pairs.iter().map(|p| p.present.clone()).collect();
                view.past_forms = pairs.iter().map(|p| p.past.clone()).collect();
                view.past_forms.shuffle(rng);
            }
            _ => {}
        }
        view
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub source: SessionSource,
    pub state: SessionState,
    pub total: usize,
    pub answered: usize,
    pub correct: usize,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub current: Option<ExerciseView>,
}

/// One attempt at a lesson or challenge.
///
/// The session only scores answers and tracks progress through its exercise
/// list; XP, hearts and persistence are applied by the caller as each answer
/// is judged.
#[derive(Debug, Clone)]
pub struct ExerciseSession {
    id: String,
    source: SessionSource,
    exercises: Vec<Exercise>,
    correct_count: usize,
    started_at: DateTime<Utc>,
    last_answer_at: DateTime<Utc>,
    deadline: Option<DateTime<Utc>>,
    timed_out: bool,
    answer_log: Vec<AnswerRecord>,
    state: SessionState,
}

impl ExerciseSession {
    pub fn new(
        source: SessionSource,
        exercises: Vec<Exercise>,
        started_at: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
    ) -> Self {
        let state = if exercises.is_empty() {
            SessionState::Completed { passed: false }
        } else {
            SessionState::InProgress { current_index: 0 }
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            exercises,
            correct_count: 0,
            started_at,
            last_answer_at: started_at,
            deadline,
            timed_out: false,
            answer_log: Vec::new(),
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &SessionSource {
        &self.source
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, SessionState::Completed { .. })
    }

    pub fn answer_log(&self) -> &[AnswerRecord] {
        &self.answer_log
    }

    pub fn total(&self) -> usize {
        self.exercises.len()
    }

    pub fn correct_count(&self) -> usize {
        self.correct_count
    }

    pub fn current_exercise(&self) -> Option<&Exercise> {
        match self.state {
            SessionState::InProgress { current_index } => self.exercises.get(current_index),
            SessionState::Completed { .. } => None,
        }
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| now > deadline)
    }

    /// Scores the current exercise and advances.
    ///
    /// Past the deadline the session is closed as failed instead and
    /// `Expired` is returned; unanswered questions count as incorrect.
    pub fn submit(
        &mut self,
        input: &AnswerInput,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, SessionError> {
        let SessionState::InProgress { current_index } = self.state else {
            return Err(SessionError::AlreadyCompleted);
        };
        if self.is_past_deadline(now) {
            self.expire();
            return Err(SessionError::Expired);
        }

        let exercise = &self.exercises[current_index];
        let correct = is_correct(exercise.kind, &exercise.rule, input)?;
        let expected = exercise.rule.expected();

        self.answer_log.push(AnswerRecord {
            prompt: exercise.prompt.clone(),
            expected: expected.clone(),
            given: input.display(),
            was_correct: correct,
            elapsed_ms: (now - self.last_answer_at).num_milliseconds().max(0),
        });
        let explanation = exercise.explanation.clone();
        self.last_answer_at = now;
        if correct {
            self.correct_count += 1;
        }

        let next = current_index + 1;
        self.state = if next >= self.exercises.len() {
            SessionState::Completed {
                passed: self.meets_criteria(),
            }
        } else {
            SessionState::InProgress {
                current_index: next,
            }
        };

        Ok(AnswerOutcome {
            correct,
            expected,
            explanation,
            finished: self.is_completed(),
        })
    }

    /// Closes the session as failed because time ran out.
    pub fn expire(&mut self) {
        if !self.is_completed() {
            self.timed_out = true;
            self.state = SessionState::Completed { passed: false };
        }
    }

    fn meets_criteria(&self) -> bool {
        if self.timed_out {
            return false;
        }
        let total = self.exercises.len();
        match &self.source {
            SessionSource::Lesson { .. } => self.correct_count >= min_correct_to_pass(total),
            SessionSource::Challenge {
                required_accuracy, ..
            } => required_accuracy.map_or(true, |required| {
                accuracy_percent(self.correct_count, total) >= f64::from(required)
            }),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let total = self.exercises.len();
        SessionSummary {
            total,
            answered: self.answer_log.len(),
            correct: self.correct_count,
            accuracy: accuracy_percent(self.correct_count, total),
            min_required: min_correct_to_pass(total),
            timed_out: self.timed_out,
            passed: match self.state {
                SessionState::Completed { passed } => Some(passed),
                SessionState::InProgress { .. } => None,
            },
        }
    }

    pub fn view<R: Rng + ?Sized>(&self, rng: &mut R) -> SessionView {
        let current = match self.state {
            SessionState::InProgress { current_index } => self
                .exercises
                .get(current_index)
                .map(|exercise| ExerciseView::build(current_index, exercise, rng)),
            SessionState::Completed { .. } => None,
        };
        SessionView {
            id: self.id.clone(),
            source: self.source.clone(),
            state: self.state,
            total: self.exercises.len(),
            answered: self.answer_log.len(),
            correct: self.correct_count,
            started_at: self.started_at,
            deadline: self.deadline,
            current,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use crate::progress::catalog::LevelCatalog;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
    }

    fn text(value: &str) -> AnswerInput {
        AnswerInput::Text {
            value: value.to_string(),
        }
    }

    fn fill_blank(correct: &str) -> Exercise {
        Exercise {
            kind: ExerciseKind::FillBlank,
            prompt: "q".to_string(),
            options: Vec::new(),
            audio: None,
            explanation: None,
            rule: AnswerRule::Normalized {
                target: correct.to_string(),
            },
        }
    }

    fn lesson_session(n: usize) -> ExerciseSession {
        ExerciseSession::new(
            SessionSource::Lesson {
                lesson_id: 1,
                xp_reward: 10,
            },
            (0..n).map(|_| fill_blank("walked")).collect(),
            t0(),
            None,
        )
    }

    #[test]
    fn translation_accepts_alternatives_case_insensitively() {
        let rule = AnswerRule::NormalizedAny {
            target: "Yesterday I cooked pasta".to_string(),
            alternatives: vec!["I cooked pasta Yesterday".to_string()],
        };
        let kind = ExerciseKind::Translation;
        assert!(is_correct(kind, &rule, &text("  i cooked pasta yesterday ")).unwrap());
        assert!(is_correct(kind, &rule, &text("yesterday i cooked pasta")).unwrap());
        assert!(!is_correct(kind, &rule, &text("I cook pasta")).unwrap());
    }

    #[test]
    fn multiple_choice_is_exact() {
        let rule = AnswerRule::Exact {
            target: "Played".to_string(),
        };
        let kind = ExerciseKind::MultipleChoice;
        assert!(is_correct(kind, &rule, &text("Played")).unwrap());
        assert!(!is_correct(kind, &rule, &text("played")).unwrap());
    }

    #[test]
    fn sentence_is_joined_tokens() {
        let rule = AnswerRule::Sequence {
            target: "I played football yesterday".to_string(),
            tokens: Vec::new(),
        };
        let tokens = |words: &[&str]| AnswerInput::Tokens {
            tokens: words.iter().map(|w| w.to_string()).collect(),
        };
        let kind = ExerciseKind::SentenceConstruction;
        assert!(is_correct(kind, &rule, &tokens(&["I", "played", "football", "yesterday"])).unwrap());
        assert!(!is_correct(kind, &rule, &tokens(&["played", "I", "football", "yesterday"])).unwrap());
    }

    #[test]
    fn matching_requires_every_pair_once() {
        let pair = |a: &str, b: &str| VerbPair {
            present: a.to_string(),
            past: b.to_string(),
        };
        let rule = AnswerRule::Pairs {
            pairs: vec![pair("go", "went"), pair("see", "saw")],
        };
        let kind = ExerciseKind::Matching;
        let answer = |pairs| AnswerInput::Pairs { pairs };
        assert!(is_correct(kind, &rule, &answer(vec![pair("see", "saw"), pair("go", "went")])).unwrap());
        assert!(!is_correct(kind, &rule, &answer(vec![pair("go", "saw"), pair("see", "went")])).unwrap());
        assert!(!is_correct(kind, &rule, &answer(vec![pair("go", "went")])).unwrap());
        assert!(!is_correct(
            kind,
            &rule,
            &answer(vec![pair("go", "went"), pair("go", "went")])
        )
        .unwrap());
    }

    #[test]
    fn wrong_input_shape_is_rejected_without_advancing() {
        let mut session = lesson_session(2);
        let err = session
            .submit(&AnswerInput::Tokens { tokens: vec![] }, t0())
            .unwrap_err();
        assert_eq!(err, SessionError::InputMismatch(ExerciseKind::FillBlank));
        assert_eq!(session.state(), SessionState::InProgress { current_index: 0 });
        assert!(session.answer_log().is_empty());
    }

    #[test]
    fn five_of_eight_fails() {
        let mut session = lesson_session(8);
        for i in 0..8 {
            let answer = if i < 5 { "walked" } else { "walk" };
            session.submit(&text(answer), t0()).unwrap();
        }
        let summary = session.summary();
        assert_eq!(summary.accuracy, 62.5);
        assert_eq!(summary.min_required, 6);
        assert_eq!(summary.passed, Some(false));
    }

    #[test]
    fn completed_session_rejects_answers() {
        let mut session = lesson_session(1);
        let outcome = session.submit(&text("walked"), t0()).unwrap();
        assert!(outcome.finished);
        assert_eq!(session.state(), SessionState::Completed { passed: true });
        assert_eq!(
            session.submit(&text("walked"), t0()).unwrap_err(),
            SessionError::AlreadyCompleted
        );
    }

    #[test]
    fn answer_log_records_elapsed_time() {
        let mut session = lesson_session(2);
        session
            .submit(&text("walked"), t0() + Duration::milliseconds(1500))
            .unwrap();
        session
            .submit(&text("nope"), t0() + Duration::milliseconds(4000))
            .unwrap();
        let log = session.answer_log();
        assert_eq!(log[0].elapsed_ms, 1500);
        assert_eq!(log[1].elapsed_ms, 2500);
        assert!(!log[1].was_correct);
        assert_eq!(log[1].given, "nope");
    }

    #[test]
    fn deadline_forces_failed_completion() {
        let mut session = ExerciseSession::new(
            SessionSource::Challenge {
                challenge_id: "speed".to_string(),
                required_accuracy: None,
                heart_reward: 2,
                xp_reward: 20,
            },
            vec![fill_blank("a"), fill_blank("b")],
            t0(),
            Some(t0() + Duration::seconds(60)),
        );
        session.submit(&text("a"), t0() + Duration::seconds(10)).unwrap();
        let err = session
            .submit(&text("b"), t0() + Duration::seconds(61))
            .unwrap_err();
        assert_eq!(err, SessionError::Expired);
        let summary = session.summary();
        assert!(summary.timed_out);
        assert_eq!(summary.passed, Some(false));
        assert_eq!(summary.answered, 1);
    }

    #[test]
    fn view_hides_answers_and_offers_word_bank() {
        let catalog = LevelCatalog::builtin().unwrap();
        let lesson = catalog.get(1).unwrap();
        let mut session = ExerciseSession::new(
            SessionSource::Lesson {
                lesson_id: 1,
                xp_reward: lesson.xp_reward,
            },
            vec![lesson.exercises[7].clone()],
            t0(),
            None,
        );
        let view = session.view(&mut rand::thread_rng());
        let current = view.current.unwrap();
        assert_eq!(current.kind, ExerciseKind::SentenceConstruction);
        let mut bank = current.word_bank.clone();
        bank.sort();
        assert_eq!(bank, vec!["I", "football", "played", "yesterday"]);

        session
            .submit(
                &AnswerInput::Tokens {
                    tokens: ["I", "played", "football", "yesterday"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                },
                t0(),
            )
            .unwrap();
        assert!(session.view(&mut rand::thread_rng()).current.is_none());
    }
}
