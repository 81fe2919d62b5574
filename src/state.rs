use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::progress::ProgressEngine;
use crate::store::Store;
use crate::sync::SyncClient;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    engine: Arc<ProgressEngine>,
    sync: Option<Arc<SyncClient>>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        engine: Arc<ProgressEngine>,
        sync: Option<Arc<SyncClient>>,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            engine,
            sync,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn engine(&self) -> &Arc<ProgressEngine> {
        &self.engine
    }

    /// `None` when remote sync is disabled.
    pub fn sync(&self) -> Option<&Arc<SyncClient>> {
        self.sync.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_tx(&self) -> &broadcast::Sender<()> {
        &self.shutdown_tx
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
