use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::broadcast;

use lingo_progress::config::{Config, ProgressConfig, SyncConfig, WorkerConfig};
use lingo_progress::progress::catalog::LevelCatalog;
use lingo_progress::progress::clock::FixedClock;
use lingo_progress::progress::ProgressEngine;
use lingo_progress::routes::build_router;
use lingo_progress::state::AppState;
use lingo_progress::store::Store;
use lingo_progress::sync::{RemoteTransport, SyncClient};

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub clock: Arc<FixedClock>,
    pub shutdown_tx: broadcast::Sender<()>,
    _temp_dir: TempDir,
}

impl TestApp {
    pub fn store(&self) -> &Store {
        self.state.store()
    }

    pub fn engine(&self) -> &ProgressEngine {
        self.state.engine()
    }
}

pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
}

pub fn test_config(temp_dir: &TempDir) -> Config {
    let sled_path = temp_dir.path().join("lingo-test.sled");
    // 直接构造 Config，避免 set_var 在并行测试中互相干扰
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        static_dir: temp_dir.path().join("static").to_string_lossy().to_string(),
        catalog_path: None,
        worker: WorkerConfig { enabled: false },
        progress: ProgressConfig::default(),
        sync: SyncConfig::default(),
    }
}

async fn build(transport: Option<Arc<dyn RemoteTransport>>) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&temp_dir);

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store
        .run_migrations(config.progress.max_hearts)
        .expect("run migrations");

    let clock = Arc::new(FixedClock::new(start_instant()));
    let sync = transport.map(|t| Arc::new(SyncClient::new(store.clone(), t)));
    let engine = Arc::new(ProgressEngine::new(
        store.clone(),
        Arc::new(LevelCatalog::builtin().expect("builtin catalog")),
        config.progress.clone(),
        clock.clone(),
        sync.clone(),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(store, engine, sync, &config, shutdown_tx.clone());
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        clock,
        shutdown_tx,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_app() -> TestApp {
    build(None).await
}

pub async fn spawn_test_app_with_sync(transport: Arc<dyn RemoteTransport>) -> TestApp {
    build(Some(transport)).await
}
