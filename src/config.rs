use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::constants::{DEFAULT_DAILY_GOAL_XP, DEFAULT_HEART_REGEN_MINUTES, DEFAULT_MAX_HEARTS};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub static_dir: String,
    /// Lesson catalog override; the embedded catalog is used when unset.
    pub catalog_path: Option<String>,
    pub worker: WorkerConfig,
    pub progress: ProgressConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub enabled: bool,
}

/// Tunable game rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressConfig {
    pub max_hearts: u32,
    pub heart_regen_minutes: i64,
    pub daily_goal_xp: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            max_hearts: DEFAULT_MAX_HEARTS,
            heart_regen_minutes: DEFAULT_HEART_REGEN_MINUTES,
            daily_goal_xp: DEFAULT_DAILY_GOAL_XP,
        }
    }
}

#[derive(Clone)]
pub struct SyncConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("api_key", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        let catalog_path = env_or("CATALOG_PATH", "");
        let max_hearts = env_or_parse("MAX_HEARTS", DEFAULT_MAX_HEARTS).max(1);
        let heart_regen_minutes =
            env_or_parse("HEART_REGEN_MINUTES", DEFAULT_HEART_REGEN_MINUTES).max(1);

        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/progress.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            static_dir: env_or("STATIC_DIR", "static"),
            catalog_path: (!catalog_path.trim().is_empty()).then_some(catalog_path),
            worker: WorkerConfig {
                enabled: env_or_bool("WORKER_ENABLED", true),
            },
            progress: ProgressConfig {
                max_hearts,
                heart_regen_minutes,
                daily_goal_xp: env_or_parse("DAILY_GOAL_XP", DEFAULT_DAILY_GOAL_XP),
            },
            sync: SyncConfig {
                enabled: env_or_bool("SYNC_ENABLED", false),
                base_url: env_or("SYNC_BASE_URL", ""),
                api_key: env_or("SYNC_API_KEY", ""),
                timeout_secs: env_or_parse("SYNC_TIMEOUT_SECS", 10_u64),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Failed to parse env var, using default");
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
