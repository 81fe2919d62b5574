use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub xp: u64,
    pub streak: u32,
    pub level: u32,
    pub last_activity: Option<NaiveDate>,
}

/// Ranking order: xp desc, then streak desc, then level desc.
pub fn compare_entries(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.xp.cmp(&a.xp)
        .then_with(|| b.streak.cmp(&a.streak))
        .then_with(|| b.level.cmp(&a.level))
        .then_with(|| a.id.cmp(&b.id))
}

impl Store {
    pub fn upsert_leaderboard_entry(&self, entry: &LeaderboardEntry) -> Result<(), StoreError> {
        let key = keys::leaderboard_key(&entry.id);
        self.leaderboard
            .insert(key.as_bytes(), Self::serialize(entry)?)?;
        Ok(())
    }

    pub fn remove_leaderboard_entry(&self, entry_id: &str) -> Result<(), StoreError> {
        self.leaderboard
            .remove(keys::leaderboard_key(entry_id).as_bytes())?;
        Ok(())
    }

    /// Moves a learner's row to a new id in one batch, so the old row
    /// never lingers next to the new one.
    pub fn rekey_leaderboard_entry(
        &self,
        old_id: &str,
        entry: &LeaderboardEntry,
    ) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        if old_id != entry.id {
            batch.remove(keys::leaderboard_key(old_id).as_bytes());
        }
        batch.insert(
            keys::leaderboard_key(&entry.id).as_bytes(),
            Self::serialize(entry)?,
        );
        self.leaderboard.apply_batch(batch)?;
        Ok(())
    }

    /// 返回按排名排序的条目。
    pub fn list_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let mut entries = Vec::new();
        for item in self.leaderboard.iter() {
            let (key, value) = item?;
            match Self::deserialize::<LeaderboardEntry>(&value) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "Skipping unreadable leaderboard entry"
                    );
                }
            }
        }
        entries.sort_by(compare_entries);
        entries.truncate(limit);
        Ok(entries)
    }
}
