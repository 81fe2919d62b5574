use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../../content/lessons.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("lesson {0} not found")]
    NotFound(u32),
    #[error("lesson {0} content unavailable")]
    ContentUnavailable(u32),
    #[error("invalid catalog: {0}")]
    Invalid(String),
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    MultipleChoice,
    FillBlank,
    Translation,
    Matching,
    SentenceConstruction,
    Listening,
    Dialogue,
    MixedExercise,
}

impl ExerciseKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "multiple_choice" => Some(Self::MultipleChoice),
            "fill_blank" => Some(Self::FillBlank),
            "translation" => Some(Self::Translation),
            "matching" => Some(Self::Matching),
            "sentence_construction" => Some(Self::SentenceConstruction),
            "listening" => Some(Self::Listening),
            "dialogue" => Some(Self::Dialogue),
            "mixed_exercise" => Some(Self::MixedExercise),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple_choice",
            Self::FillBlank => "fill_blank",
            Self::Translation => "translation",
            Self::Matching => "matching",
            Self::SentenceConstruction => "sentence_construction",
            Self::Listening => "listening",
            Self::Dialogue => "dialogue",
            Self::MixedExercise => "mixed_exercise",
        }
    }

    pub fn has_options(self) -> bool {
        matches!(
            self,
            Self::MultipleChoice | Self::Listening | Self::MixedExercise
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbPair {
    pub present: String,
    pub past: String,
}

/// How an answer is judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerRule {
    /// Byte-for-byte match.
    Exact { target: String },
    /// Trimmed, case-insensitive match.
    Normalized { target: String },
    /// Trimmed, case-insensitive match against the target or any alternative.
    NormalizedAny {
        target: String,
        alternatives: Vec<String>,
    },
    /// Every pair matched to itself, each exactly once.
    Pairs { pairs: Vec<VerbPair> },
    /// Tokens joined with single spaces must equal the target.
    Sequence { target: String, tokens: Vec<String> },
}

impl AnswerRule {
    /// Human-readable expected answer for feedback and the answer log.
    pub fn expected(&self) -> String {
        match self {
            Self::Exact { target }
            | Self::Normalized { target }
            | Self::NormalizedAny { target, .. }
            | Self::Sequence { target, .. } => target.clone(),
            Self::Pairs { pairs } => pairs
                .iter()
                .map(|p| format!("{} → {}", p.present, p.past))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exercise {
    pub kind: ExerciseKind,
    pub prompt: String,
    pub options: Vec<String>,
    pub audio: Option<String>,
    pub explanation: Option<String>,
    pub rule: AnswerRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonDefinition {
    pub id: u32,
    pub title: String,
    pub subtitle: String,
    pub difficulty: String,
    pub xp_reward: u64,
    pub hearts_required: u32,
    pub exercises: Vec<Exercise>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    pub id: u32,
    pub title: String,
    pub subtitle: String,
    pub difficulty: String,
    pub xp_reward: u64,
    pub hearts_required: u32,
    pub exercise_count: usize,
    pub available: bool,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    lessons: Vec<RawLesson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLesson {
    id: u32,
    title: String,
    #[serde(default)]
    subtitle: String,
    #[serde(default)]
    difficulty: String,
    xp_reward: u64,
    #[serde(default)]
    hearts_required: u32,
    #[serde(default)]
    exercises: Vec<RawExercise>,
}

#[derive(Debug, Deserialize)]
struct RawExercise {
    #[serde(rename = "type")]
    kind: String,
    question: String,
    #[serde(default)]
    options: Vec<String>,
    correct: Option<String>,
    #[serde(default)]
    alternatives: Vec<String>,
    #[serde(default)]
    pairs: Vec<VerbPair>,
    audio: Option<String>,
    explanation: Option<String>,
}

#[derive(Debug, Clone)]
enum CatalogEntry {
    Ready(LessonDefinition),
    Unavailable {
        summary: LessonSummary,
        reason: String,
    },
}

/// Ordered, read-only lesson definitions.
#[derive(Debug, Clone)]
pub struct LevelCatalog {
    lessons: BTreeMap<u32, CatalogEntry>,
}

impl LevelCatalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parses a catalog. Ids must run 1..=N without gaps; a lesson with a
    /// malformed exercise is kept but marked unavailable.
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let parsed: RawCatalog =
            serde_json::from_str(raw).map_err(|e| CatalogError::Invalid(e.to_string()))?;

        let mut lessons = BTreeMap::new();
        for lesson in parsed.lessons {
            let id = lesson.id;
            if lessons.contains_key(&id) {
                return Err(CatalogError::Invalid(format!("duplicate lesson id {id}")));
            }
            lessons.insert(id, build_entry(lesson));
        }

        for (expected, actual) in (1_u32..).zip(lessons.keys()) {
            if expected != *actual {
                return Err(CatalogError::Invalid(format!(
                    "lesson ids must be contiguous from 1, found {actual} where {expected} was expected"
                )));
            }
        }

        Ok(Self { lessons })
    }

    pub fn get(&self, lesson_id: u32) -> Result<&LessonDefinition, CatalogError> {
        match self.lessons.get(&lesson_id) {
            Some(CatalogEntry::Ready(lesson)) => Ok(lesson),
            Some(CatalogEntry::Unavailable { reason, .. }) => {
                tracing::error!(lesson_id, reason = %reason, "Lesson content unavailable");
                Err(CatalogError::ContentUnavailable(lesson_id))
            }
            None => Err(CatalogError::NotFound(lesson_id)),
        }
    }

    pub fn contains(&self, lesson_id: u32) -> bool {
        self.lessons.contains_key(&lesson_id)
    }

    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }

    /// 未知课程视为无要求。
    pub fn hearts_required(&self, lesson_id: u32) -> u32 {
        match self.lessons.get(&lesson_id) {
            Some(CatalogEntry::Ready(lesson)) => lesson.hearts_required,
            Some(CatalogEntry::Unavailable { summary, .. }) => summary.hearts_required,
            None => 0,
        }
    }

    pub fn summaries(&self) -> Vec<LessonSummary> {
        self.lessons
            .values()
            .map(|entry| match entry {
                CatalogEntry::Ready(lesson) => summarize(lesson, true),
                CatalogEntry::Unavailable { summary, .. } => summary.clone(),
            })
            .collect()
    }

    /// Exercises of the given kinds from every usable lesson, in catalog order.
    pub fn exercises_of_kinds(&self, kinds: &[ExerciseKind]) -> Vec<&Exercise> {
        self.lessons
            .values()
            .filter_map(|entry| match entry {
                CatalogEntry::Ready(lesson) => Some(lesson),
                CatalogEntry::Unavailable { .. } => None,
            })
            .flat_map(|lesson| lesson.exercises.iter())
            .filter(|exercise| kinds.contains(&exercise.kind))
            .collect()
    }
}

fn summarize(lesson: &LessonDefinition, available: bool) -> LessonSummary {
    LessonSummary {
        id: lesson.id,
        title: lesson.title.clone(),
        subtitle: lesson.subtitle.clone(),
        difficulty: lesson.difficulty.clone(),
        xp_reward: lesson.xp_reward,
        hearts_required: lesson.hearts_required,
        exercise_count: lesson.exercises.len(),
        available,
    }
}

fn build_entry(raw: RawLesson) -> CatalogEntry {
    let exercise_count = raw.exercises.len();
    let mut exercises = Vec::with_capacity(exercise_count);
    let mut failure = if raw.exercises.is_empty() {
        Some("lesson has no exercises".to_string())
    } else {
        None
    };

    for (index, exercise) in raw.exercises.into_iter().enumerate() {
        match build_exercise(exercise) {
            Ok(exercise) => exercises.push(exercise),
            Err(reason) => {
                failure.get_or_insert(format!("exercise {index}: {reason}"));
            }
        }
    }

    let lesson = LessonDefinition {
        id: raw.id,
        title: raw.title,
        subtitle: raw.subtitle,
        difficulty: raw.difficulty,
        xp_reward: raw.xp_reward,
        hearts_required: raw.hearts_required,
        exercises,
    };

    match failure {
        None => CatalogEntry::Ready(lesson),
        Some(reason) => {
            tracing::error!(lesson_id = lesson.id, reason = %reason, "Invalid lesson definition");
            let mut summary = summarize(&lesson, false);
            summary.exercise_count = exercise_count;
            CatalogEntry::Unavailable { summary, reason }
        }
    }
}

fn build_exercise(raw: RawExercise) -> Result<Exercise, String> {
    let kind =
        ExerciseKind::parse(&raw.kind).ok_or_else(|| format!("unknown type '{}'", raw.kind))?;

    let correct = raw
        .correct
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let require_correct = || correct.clone().ok_or_else(|| "missing correct answer".to_string());

    let rule = match kind {
        ExerciseKind::MultipleChoice | ExerciseKind::Listening | ExerciseKind::MixedExercise => {
            let target = require_correct()?;
            if !raw.options.iter().any(|o| o == &target) {
                return Err("correct answer is not among the options".to_string());
            }
            AnswerRule::Exact { target }
        }
        ExerciseKind::FillBlank | ExerciseKind::Dialogue => AnswerRule::Normalized {
            target: require_correct()?,
        },
        ExerciseKind::Translation => AnswerRule::NormalizedAny {
            target: require_correct()?,
            alternatives: raw
                .alternatives
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
        },
        ExerciseKind::Matching => {
            if raw.pairs.is_empty() {
                return Err("matching exercise without pairs".to_string());
            }
            AnswerRule::Pairs { pairs: raw.pairs }
        }
        ExerciseKind::SentenceConstruction => {
            let target = require_correct()?;
            let tokens = word_bank(&raw.question);
            if !same_words(&tokens, &target) {
                return Err("word bank cannot form the correct sentence".to_string());
            }
            AnswerRule::Sequence { target, tokens }
        }
    };

    Ok(Exercise {
        kind,
        prompt: raw.question,
        options: if kind.has_options() {
            raw.options
        } else {
            Vec::new()
        },
        audio: raw.audio,
        explanation: raw.explanation,
        rule,
    })
}

/// Tokens are the quoted part of the prompt, separated by " / ".
pub fn word_bank(prompt: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (prompt.find('\''), prompt.rfind('\'')) else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }
    prompt[start + 1..end]
        .split(" / ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn same_words(tokens: &[String], target: &str) -> bool {
    let mut from_tokens: Vec<&str> = tokens.iter().flat_map(|t| t.split_whitespace()).collect();
    let mut from_target: Vec<&str> = target.split_whitespace().collect();
    from_tokens.sort_unstable();
    from_target.sort_unstable();
    !from_tokens.is_empty() && from_tokens == from_target
}
