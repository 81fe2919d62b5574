use std::collections::BTreeSet;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::Transactional;

use crate::constants::XP_PER_LEVEL;
use crate::store::keys;
use crate::store::{map_transaction_error, Store, StoreError};

/// 学习者档案，每台设备一份。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProfile {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub xp: u64,
    pub streak: u32,
    pub hearts: u32,
    pub level: u32,
    pub daily_progress: u64,
    pub daily_progress_date: Option<NaiveDate>,
    #[serde(rename = "lastActivity")]
    pub last_activity_date: Option<NaiveDate>,
    pub completed_lessons: BTreeSet<u32>,
    pub achievements: BTreeSet<String>,
}

impl LearnerProfile {
    pub fn new(max_hearts: u32) -> Self {
        Self {
            id: None,
            name: None,
            email: None,
            xp: 0,
            streak: 0,
            hearts: max_hearts,
            level: 1,
            daily_progress: 0,
            daily_progress_date: None,
            last_activity_date: None,
            completed_lessons: BTreeSet::new(),
            achievements: BTreeSet::new(),
        }
    }

    pub fn level_for_xp(xp: u64) -> u32 {
        u32::try_from(xp / XP_PER_LEVEL)
            .unwrap_or(u32::MAX - 1)
            .saturating_add(1)
    }

    pub fn recompute_level(&mut self) {
        self.level = Self::level_for_xp(self.xp);
    }

    /// Rebuilds a profile from an untrusted JSON object.
    ///
    /// Absent, non-numeric, negative or NaN fields fall back to defaults:
    /// hearts to `max_hearts` (clamped when out of range), counters to 0,
    /// collections to empty. `level` is always derived from `xp`.
    pub fn from_value(value: &Value, max_hearts: u32) -> Self {
        let field = |name: &str| value.get(name);

        let hearts = match coerce_count(field("hearts")) {
            Some(h) => h.min(u64::from(max_hearts)) as u32,
            None => max_hearts,
        };

        let mut profile = Self {
            id: coerce_text(field("id")),
            name: coerce_text(field("name")),
            email: coerce_text(field("email")),
            xp: coerce_count(field("xp")).unwrap_or(0),
            streak: coerce_count(field("streak"))
                .map(|s| u32::try_from(s).unwrap_or(u32::MAX))
                .unwrap_or(0),
            hearts,
            level: 1,
            daily_progress: coerce_count(field("dailyProgress")).unwrap_or(0),
            daily_progress_date: field("dailyProgressDate").and_then(parse_calendar_date),
            last_activity_date: field("lastActivity")
                .or_else(|| field("lastActivityDate"))
                .and_then(parse_calendar_date),
            completed_lessons: coerce_lesson_ids(field("completedLessons")),
            achievements: coerce_strings(field("achievements")),
        };
        profile.recompute_level();
        profile
    }
}

/// Timestamps used by the time-driven rules, stored apart from the profile record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMarkers {
    pub last_heart_granted: Option<DateTime<Utc>>,
    pub last_daily_reset: Option<NaiveDate>,
    pub last_daily_goal: Option<NaiveDate>,
}

impl Store {
    /// Loads the learner profile, folding any imported legacy keys first.
    pub fn load_profile(&self, max_hearts: u32) -> Result<LearnerProfile, StoreError> {
        crate::store::legacy::fold_if_present(self, max_hearts)?;
        Ok(match self.read_profile_value()? {
            Some(value) => LearnerProfile::from_value(&value, max_hearts),
            None => LearnerProfile::new(max_hearts),
        })
    }

    pub fn save_profile(&self, profile: &LearnerProfile) -> Result<(), StoreError> {
        let bytes = Self::serialize(profile)?;
        self.profile.insert(keys::PROFILE_KEY.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn load_markers(&self) -> Result<ProgressMarkers, StoreError> {
        let read = |key: &str| -> Result<Option<Value>, StoreError> {
            Ok(self
                .progress_markers
                .get(key.as_bytes())?
                .and_then(|raw| parse_raw_value(&raw)))
        };

        Ok(ProgressMarkers {
            last_heart_granted: read(keys::MARKER_LAST_HEART_GRANTED)?
                .as_ref()
                .and_then(parse_instant),
            last_daily_reset: read(keys::MARKER_LAST_DAILY_RESET)?
                .as_ref()
                .and_then(parse_calendar_date),
            last_daily_goal: read(keys::MARKER_LAST_DAILY_GOAL)?
                .as_ref()
                .and_then(parse_calendar_date),
        })
    }

    /// Writes profile and markers in one transaction.
    pub fn save_progress(
        &self,
        profile: &LearnerProfile,
        markers: &ProgressMarkers,
    ) -> Result<(), StoreError> {
        let profile_bytes = Self::serialize(profile)?;
        let marker_entries = marker_entries(markers)?;

        (&self.profile, &self.progress_markers)
            .transaction(|(tx_profile, tx_markers)| {
                tx_profile.insert(keys::PROFILE_KEY.as_bytes(), profile_bytes.as_slice())?;
                for (key, bytes) in &marker_entries {
                    match bytes {
                        Some(bytes) => {
                            tx_markers.insert(key.as_bytes(), bytes.as_slice())?;
                        }
                        None => {
                            tx_markers.remove(key.as_bytes())?;
                        }
                    }
                }
                Ok(())
            })
            .map_err(map_transaction_error)?;

        Ok(())
    }

    pub(crate) fn read_profile_value(&self) -> Result<Option<Value>, StoreError> {
        Ok(self
            .profile
            .get(keys::PROFILE_KEY.as_bytes())?
            .and_then(|raw| match serde_json::from_slice::<Value>(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, "Stored profile record is not valid JSON, using defaults");
                    None
                }
            }))
    }
}

pub(crate) fn marker_entries(
    markers: &ProgressMarkers,
) -> Result<Vec<(&'static str, Option<Vec<u8>>)>, StoreError> {
    Ok(vec![
        (
            keys::MARKER_LAST_HEART_GRANTED,
            markers
                .last_heart_granted
                .as_ref()
                .map(Store::serialize)
                .transpose()?,
        ),
        (
            keys::MARKER_LAST_DAILY_RESET,
            markers
                .last_daily_reset
                .as_ref()
                .map(Store::serialize)
                .transpose()?,
        ),
        (
            keys::MARKER_LAST_DAILY_GOAL,
            markers
                .last_daily_goal
                .as_ref()
                .map(Store::serialize)
                .transpose()?,
        ),
    ])
}

/// Decodes stored bytes as JSON, falling back to a bare string for values
/// written by a browser (`true`, `Thu Oct 16 2026`, `1760000000000`).
pub(crate) fn parse_raw_value(raw: &[u8]) -> Option<Value> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(value) => Some(value),
        Err(_) => std::str::from_utf8(raw)
            .ok()
            .map(|text| Value::String(text.to_string())),
    }
}

pub(crate) fn coerce_count(value: Option<&Value>) -> Option<u64> {
    let number = match value? {
        Value::Number(n) => n.as_u64().map(|v| v as f64).or_else(|| n.as_f64())?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    Some(number.floor() as u64)
}

fn coerce_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn coerce_lesson_ids(value: Option<&Value>) -> BTreeSet<u32> {
    let Some(Value::Array(items)) = value else {
        return BTreeSet::new();
    };
    items
        .iter()
        .filter_map(|item| coerce_count(Some(item)))
        .filter(|id| *id >= 1)
        .filter_map(|id| u32::try_from(id).ok())
        .collect()
}

fn coerce_strings(value: Option<&Value>) -> BTreeSet<String> {
    let Some(Value::Array(items)) = value else {
        return BTreeSet::new();
    };
    items
        .iter()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Accepts `YYYY-MM-DD`, RFC 3339 and the browser `toDateString` form.
pub(crate) fn parse_calendar_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| {
                    DateTime::parse_from_rfc3339(s)
                        .ok()
                        .map(|dt| dt.with_timezone(&Local).date_naive())
                })
                .or_else(|| NaiveDate::parse_from_str(s, "%a %b %d %Y").ok())
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Local.timestamp_millis_opt(ms).single())
            .map(|dt| dt.date_naive()),
        _ => None,
    }
}

/// Accepts RFC 3339 strings or epoch milliseconds (as number or string).
pub(crate) fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|| {
                    s.parse::<i64>()
                        .ok()
                        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                })
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
