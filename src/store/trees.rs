pub const PROFILE: &str = "profile";
pub const LEGACY_KV: &str = "legacy_kv";
pub const PROGRESS_MARKERS: &str = "progress_markers";
pub const LEADERBOARD: &str = "leaderboard";
pub const SYNC_QUEUE: &str = "sync_queue";
pub const CONFIG_VERSIONS: &str = "config_versions";
