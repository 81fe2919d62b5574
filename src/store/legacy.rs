//! Browser local-storage compatibility.
//!
//! Older clients kept progress in several overlapping keys: a `userData`
//! object, top-level copies of its counters, a `completedLessons` array and
//! one `nivel{N}_completado` flag per lesson. A dump of those keys can be
//! imported as-is; the next profile load folds them into the canonical record
//! once and deletes them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde_json::{Map, Value};
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::leaderboard::LeaderboardEntry;
use crate::store::operations::profile::{
    coerce_count, coerce_lesson_ids, marker_entries, parse_calendar_date, parse_instant,
    parse_raw_value, LearnerProfile,
};
use crate::store::operations::sync_queue::{OperationKind, PendingOperation};
use crate::store::{map_transaction_error, Store, StoreError};

fn is_known_key(key: &str) -> bool {
    key == keys::LEGACY_USER_DATA
        || key == keys::LEGACY_COMPLETED_LESSONS
        || key == keys::LEGACY_RANKING
        || key == keys::LEGACY_SYNC_QUEUE
        || keys::LEGACY_FALLBACK_FIELDS.contains(&key)
        || keys::LEGACY_MARKER_KEYS.contains(&key)
        || keys::parse_legacy_level_flag(key).is_some()
}

impl Store {
    /// Stores a raw local-storage dump for folding on the next load.
    /// Returns the number of recognised keys written.
    pub fn import_local_storage(
        &self,
        entries: &BTreeMap<String, String>,
    ) -> Result<usize, StoreError> {
        let mut written = 0;
        for (key, value) in entries {
            if !is_known_key(key) {
                tracing::debug!(key = %key, "Ignoring unrecognised local-storage key");
                continue;
            }
            self.legacy_kv.insert(key.as_bytes(), value.as_bytes())?;
            written += 1;
        }
        tracing::info!(written, total = entries.len(), "Imported local-storage dump");
        Ok(written)
    }
}

/// Folds legacy keys into the canonical profile. Returns `false` when there
/// was nothing to fold.
pub fn fold_if_present(store: &Store, max_hearts: u32) -> Result<bool, StoreError> {
    if store.legacy_kv.is_empty() {
        return Ok(false);
    }

    let mut legacy: BTreeMap<String, Value> = BTreeMap::new();
    for item in store.legacy_kv.iter() {
        let (key, raw) = item?;
        let key = String::from_utf8_lossy(&key).to_string();
        if let Some(value) = parse_raw_value(&raw) {
            legacy.insert(key, value);
        }
    }

    if let Some(ranking) = legacy.get(keys::LEGACY_RANKING) {
        fold_ranking(store, ranking)?;
        store.legacy_kv.remove(keys::LEGACY_RANKING.as_bytes())?;
    }
    if let Some(queue) = legacy.get(keys::LEGACY_SYNC_QUEUE) {
        fold_sync_queue(store, queue)?;
        store.legacy_kv.remove(keys::LEGACY_SYNC_QUEUE.as_bytes())?;
    }

    let mut base = match store.read_profile_value()? {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    merge_user_data(&mut base, &legacy);

    let mut profile = LearnerProfile::from_value(&Value::Object(base), max_hearts);
    let folded_lessons = legacy_completions(&legacy);
    let before = profile.completed_lessons.len();
    profile.completed_lessons.extend(folded_lessons);

    let mut markers = store.load_markers()?;
    if markers.last_heart_granted.is_none() {
        markers.last_heart_granted = legacy
            .get(keys::MARKER_LAST_HEART_GRANTED)
            .and_then(parse_instant);
    }
    if markers.last_daily_reset.is_none() {
        markers.last_daily_reset = legacy
            .get(keys::MARKER_LAST_DAILY_RESET)
            .and_then(parse_calendar_date);
    }
    if markers.last_daily_goal.is_none() {
        markers.last_daily_goal = legacy
            .get(keys::MARKER_LAST_DAILY_GOAL)
            .and_then(parse_calendar_date);
    }

    let profile_bytes = Store::serialize(&profile)?;
    let marker_entries = marker_entries(&markers)?;
    let retired: Vec<String> = legacy.keys().cloned().collect();

    (&store.profile, &store.progress_markers, &store.legacy_kv)
        .transaction(|(tx_profile, tx_markers, tx_legacy)| {
            tx_profile.insert(keys::PROFILE_KEY.as_bytes(), profile_bytes.as_slice())?;
            for (key, bytes) in &marker_entries {
                if let Some(bytes) = bytes {
                    tx_markers.insert(key.as_bytes(), bytes.as_slice())?;
                }
            }
            for key in &retired {
                tx_legacy.remove(key.as_bytes())?;
            }
            Ok(())
        })
        .map_err(map_transaction_error)?;

    tracing::info!(
        retired_keys = retired.len(),
        lessons_added = profile.completed_lessons.len().saturating_sub(before),
        "Folded legacy progress into canonical profile"
    );
    Ok(true)
}

/// Canonical fields win; `userData` fills the gaps, then the top-level
/// counters fill whatever is still missing.
fn merge_user_data(base: &mut Map<String, Value>, legacy: &BTreeMap<String, Value>) {
    if let Some(Value::Object(user_data)) = legacy.get(keys::LEGACY_USER_DATA) {
        for (field, value) in user_data {
            if is_missing(base.get(field)) {
                base.insert(field.clone(), value.clone());
            }
        }
    }
    for field in keys::LEGACY_FALLBACK_FIELDS {
        if is_missing(base.get(*field)) {
            if let Some(value) = legacy.get(*field) {
                base.insert((*field).to_string(), value.clone());
            }
        }
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Union of `userData.completedLessons`, the top-level list and the
/// per-lesson flags. Applied on top of the canonical set, never instead of it.
fn legacy_completions(legacy: &BTreeMap<String, Value>) -> BTreeSet<u32> {
    let mut lessons = coerce_lesson_ids(legacy.get(keys::LEGACY_COMPLETED_LESSONS));
    if let Some(Value::Object(user_data)) = legacy.get(keys::LEGACY_USER_DATA) {
        lessons.extend(coerce_lesson_ids(user_data.get("completedLessons")));
    }
    for (key, value) in legacy {
        let Some(lesson_id) = keys::parse_legacy_level_flag(key) else {
            continue;
        };
        if lesson_id == 0 || lesson_id > keys::LEGACY_LEVEL_FLAG_MAX {
            continue;
        }
        let set = match value {
            Value::Bool(b) => *b,
            Value::String(s) => s.trim() == "true",
            _ => false,
        };
        if set {
            lessons.insert(lesson_id);
        }
    }
    lessons
}

fn fold_ranking(store: &Store, ranking: &Value) -> Result<(), StoreError> {
    let Value::Array(items) = ranking else {
        return Ok(());
    };
    for item in items {
        let id = match item.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if store
            .leaderboard
            .contains_key(keys::leaderboard_key(&id).as_bytes())?
        {
            continue;
        }
        let xp = coerce_count(item.get("xp")).unwrap_or(0);
        let entry = LeaderboardEntry {
            name: item
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Learner")
                .to_string(),
            xp,
            streak: coerce_count(item.get("streak"))
                .and_then(|s| u32::try_from(s).ok())
                .unwrap_or(0),
            level: LearnerProfile::level_for_xp(xp),
            last_activity: item.get("lastActivity").and_then(parse_calendar_date),
            id,
        };
        store.upsert_leaderboard_entry(&entry)?;
    }
    Ok(())
}

fn fold_sync_queue(store: &Store, queue: &Value) -> Result<(), StoreError> {
    let Value::Array(items) = queue else {
        return Ok(());
    };
    for item in items {
        let name = item.get("type").and_then(Value::as_str).unwrap_or_default();
        let Some(kind) = OperationKind::from_legacy(name) else {
            tracing::warn!(operation = %name, "Dropping queued operation of unknown type");
            continue;
        };
        let timestamp = item
            .get("timestamp")
            .and_then(parse_instant)
            .unwrap_or_else(Utc::now);
        let payload = item.get("data").cloned().unwrap_or(Value::Null);
        store.enqueue_operation(&PendingOperation::new(kind, payload, timestamp))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn dump(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn completions_union_list_and_flags() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("legacy").to_str().unwrap()).unwrap();

        store
            .import_local_storage(&dump(&[
                ("completedLessons", "[1,2]"),
                ("nivel3_completado", "true"),
                ("nivel4_completado", "false"),
                ("nivel11_completado", "true"),
                ("unrelated", "x"),
            ]))
            .unwrap();

        let profile = store.load_profile(5).unwrap();
        assert_eq!(profile.completed_lessons, BTreeSet::from([1, 2, 3]));
        assert!(store.legacy_kv.is_empty());
    }

    #[test]
    fn user_data_lessons_join_an_existing_profile() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("legacy-union").to_str().unwrap()).unwrap();

        let mut profile = LearnerProfile::new(5);
        profile.completed_lessons.insert(1);
        store.save_profile(&profile).unwrap();

        store
            .import_local_storage(&dump(&[("userData", r#"{"completedLessons":[2,3]}"#)]))
            .unwrap();

        let profile = store.load_profile(5).unwrap();
        assert_eq!(profile.completed_lessons, BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn top_level_counters_fill_missing_user_data() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("legacy2").to_str().unwrap()).unwrap();

        store
            .import_local_storage(&dump(&[
                ("userData", r#"{"name":"Ana","xp":120,"hearts":2}"#),
                ("xp", "999"),
                ("streak", "4"),
                ("hearts", "5"),
            ]))
            .unwrap();

        let profile = store.load_profile(5).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Ana"));
        assert_eq!(profile.xp, 120);
        assert_eq!(profile.streak, 4);
        assert_eq!(profile.hearts, 2);
        assert_eq!(profile.level, 2);
    }

    #[test]
    fn fold_runs_once() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("legacy3").to_str().unwrap()).unwrap();

        store
            .import_local_storage(&dump(&[("nivel1_completado", "true")]))
            .unwrap();
        assert!(fold_if_present(&store, 5).unwrap());
        assert!(!fold_if_present(&store, 5).unwrap());
        assert!(store.load_profile(5).unwrap().completed_lessons.contains(&1));
    }

    #[test]
    fn queue_and_markers_are_carried_over() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("legacy4").to_str().unwrap()).unwrap();

        store
            .import_local_storage(&dump(&[
                (
                    "syncQueue",
                    r#"[{"type":"saveProgress","data":{"xp":5},"timestamp":"2026-10-15T10:00:00Z"},{"type":"bogus","data":{}}]"#,
                ),
                ("lastHeartTime", "1760000000000"),
                ("lastDailyReset", "Thu Oct 15 2026"),
            ]))
            .unwrap();

        store.load_profile(5).unwrap();
        let queued = store.list_pending_operations().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].1.kind, OperationKind::SaveProgress);

        let markers = store.load_markers().unwrap();
        assert!(markers.last_heart_granted.is_some());
        assert_eq!(
            markers.last_daily_reset,
            chrono::NaiveDate::from_ymd_opt(2026, 10, 15)
        );
    }
}
