use serde::Serialize;

/// Notifications emitted by the engine after a state change is persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    StreakMaintained {
        streak: u32,
    },
    StreakLost {
        days_missed: i64,
    },
    XpGained {
        amount: u64,
        total: u64,
    },
    DailyGoalCompleted {
        bonus: u64,
    },
    LevelUp {
        level: u32,
    },
    HeartLost {
        hearts: u32,
    },
    HeartGained {
        hearts: u32,
    },
    HeartsRefilled {
        hearts: u32,
    },
    LessonCompleted {
        lesson_id: u32,
        passed: bool,
        xp_awarded: u64,
        accuracy: f64,
    },
    ChallengeCompleted {
        challenge_id: String,
        succeeded: bool,
        hearts_awarded: u32,
        xp_awarded: u64,
    },
}

impl ProgressEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StreakMaintained { .. } => "streak_maintained",
            Self::StreakLost { .. } => "streak_lost",
            Self::XpGained { .. } => "xp_gained",
            Self::DailyGoalCompleted { .. } => "daily_goal_completed",
            Self::LevelUp { .. } => "level_up",
            Self::HeartLost { .. } => "heart_lost",
            Self::HeartGained { .. } => "heart_gained",
            Self::HeartsRefilled { .. } => "hearts_refilled",
            Self::LessonCompleted { .. } => "lesson_completed",
            Self::ChallengeCompleted { .. } => "challenge_completed",
        }
    }
}
