/// 本地设备只保存一个学习者档案。
pub const PROFILE_KEY: &str = "learner";

pub const MARKER_LAST_HEART_GRANTED: &str = "lastHeartTime";
pub const MARKER_LAST_DAILY_RESET: &str = "lastDailyReset";
pub const MARKER_LAST_DAILY_GOAL: &str = "lastDailyGoalCompletion";

// Browser local-storage key names, kept verbatim so imported dumps can be folded.
pub const LEGACY_USER_DATA: &str = "userData";
pub const LEGACY_COMPLETED_LESSONS: &str = "completedLessons";
pub const LEGACY_RANKING: &str = "userRanking";
pub const LEGACY_SYNC_QUEUE: &str = "syncQueue";
pub const LEGACY_FALLBACK_FIELDS: &[&str] = &["xp", "streak", "hearts", "dailyProgress", "level"];
pub const LEGACY_MARKER_KEYS: &[&str] = &[
    MARKER_LAST_HEART_GRANTED,
    MARKER_LAST_DAILY_RESET,
    MARKER_LAST_DAILY_GOAL,
];

/// Highest lesson number probed for `nivel{N}_completado` flags.
pub const LEGACY_LEVEL_FLAG_MAX: u32 = 10;

pub fn legacy_level_flag_key(lesson_id: u32) -> String {
    format!("nivel{lesson_id}_completado")
}

/// Parses `nivel{N}_completado` back to `N`.
pub fn parse_legacy_level_flag(key: &str) -> Option<u32> {
    key.strip_prefix("nivel")?
        .strip_suffix("_completado")?
        .parse::<u32>()
        .ok()
}

pub fn leaderboard_key(entry_id: &str) -> String {
    format!("entry:{entry_id}")
}

/// Sync queue keys sort in insertion order.
pub fn sync_queue_key(seq: u64) -> String {
    format!("{seq:020}")
}
