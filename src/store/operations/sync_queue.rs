use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateUser,
    UpdateUser,
    SaveProgress,
    UpdateRanking,
    TrackEvent,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateUser => "create_user",
            Self::UpdateUser => "update_user",
            Self::SaveProgress => "save_progress",
            Self::UpdateRanking => "update_ranking",
            Self::TrackEvent => "track_event",
        }
    }

    /// Maps the camelCase operation names found in browser queue dumps.
    pub fn from_legacy(name: &str) -> Option<Self> {
        match name {
            "createUser" | "create_user" => Some(Self::CreateUser),
            "updateUser" | "update_user" => Some(Self::UpdateUser),
            "saveProgress" | "save_progress" => Some(Self::SaveProgress),
            "updateRanking" | "update_ranking" => Some(Self::UpdateRanking),
            "trackEvent" | "track_event" => Some(Self::TrackEvent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub id: String,
    pub kind: OperationKind,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
}

impl PendingOperation {
    pub fn new(kind: OperationKind, payload: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload,
            timestamp,
            attempts: 0,
        }
    }
}

impl Store {
    /// Appends to the tail of the queue and returns the entry key.
    pub fn enqueue_operation(&self, op: &PendingOperation) -> Result<String, StoreError> {
        let key = keys::sync_queue_key(self.next_sequence()?);
        self.sync_queue.insert(key.as_bytes(), Self::serialize(op)?)?;
        Ok(key)
    }

    /// Queue contents in FIFO order. Unreadable entries are dropped.
    pub fn list_pending_operations(&self) -> Result<Vec<(String, PendingOperation)>, StoreError> {
        let mut out = Vec::new();
        for item in self.sync_queue.iter() {
            let (key, value) = item?;
            let key = String::from_utf8_lossy(&key).to_string();
            match Self::deserialize::<PendingOperation>(&value) {
                Ok(op) => out.push((key, op)),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Dropping unreadable sync queue entry");
                    self.sync_queue.remove(key.as_bytes())?;
                }
            }
        }
        Ok(out)
    }

    pub fn update_pending_operation(
        &self,
        key: &str,
        op: &PendingOperation,
    ) -> Result<(), StoreError> {
        if !self.sync_queue.contains_key(key.as_bytes())? {
            return Err(StoreError::NotFound {
                entity: "sync_queue".to_string(),
                key: key.to_string(),
            });
        }
        self.sync_queue.insert(key.as_bytes(), Self::serialize(op)?)?;
        Ok(())
    }

    pub fn remove_pending_operation(&self, key: &str) -> Result<(), StoreError> {
        self.sync_queue.remove(key.as_bytes())?;
        Ok(())
    }

    pub fn pending_operation_count(&self) -> usize {
        self.sync_queue.len()
    }
}
