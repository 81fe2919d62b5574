pub mod keys;
pub mod legacy;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::TransactionError;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub profile: sled::Tree,
    pub legacy_kv: sled::Tree,
    pub progress_markers: sled::Tree,
    pub leaderboard: sled::Tree,
    pub sync_queue: sled::Tree,
    pub config_versions: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let profile = db.open_tree(trees::PROFILE)?;
        let legacy_kv = db.open_tree(trees::LEGACY_KV)?;
        let progress_markers = db.open_tree(trees::PROGRESS_MARKERS)?;
        let leaderboard = db.open_tree(trees::LEADERBOARD)?;
        let sync_queue = db.open_tree(trees::SYNC_QUEUE)?;
        let config_versions = db.open_tree(trees::CONFIG_VERSIONS)?;

        Ok(Self {
            db,
            profile,
            legacy_kv,
            progress_markers,
            leaderboard,
            sync_queue,
            config_versions,
        })
    }

    pub fn run_migrations(&self, max_hearts: u32) -> Result<(), StoreError> {
        migrate::run(self, max_hearts)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Monotonic id used for FIFO ordering of queued items.
    pub(crate) fn next_sequence(&self) -> Result<u64, StoreError> {
        Ok(self.db.generate_id()?)
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub(crate) fn map_transaction_error(err: TransactionError<()>) -> StoreError {
    match err {
        TransactionError::Abort(()) => {
            StoreError::Sled(sled::Error::Unsupported("transaction aborted".into()))
        }
        TransactionError::Storage(se) => StoreError::Sled(se),
    }
}
