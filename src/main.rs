use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue};
use lingo_progress::config::Config;
use lingo_progress::logging::{init_tracing, LogConfig};
use lingo_progress::progress::catalog::LevelCatalog;
use lingo_progress::progress::clock::SystemClock;
use lingo_progress::progress::ProgressEngine;
use lingo_progress::routes::build_router;
use lingo_progress::state::AppState;
use lingo_progress::store::Store;
use lingo_progress::sync::{HttpTransport, SyncClient};
use lingo_progress::workers::WorkerManager;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(&LogConfig::from(&config));
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting lingo-progress");

    let store = Arc::new(Store::open(&config.sled_path)?);
    store.run_migrations(config.progress.max_hearts)?;

    let catalog = Arc::new(match &config.catalog_path {
        Some(path) => {
            tracing::info!(path = %path, "Loading lesson catalog from file");
            LevelCatalog::from_path(path)?
        }
        None => LevelCatalog::builtin()?,
    });
    tracing::info!(lessons = catalog.len(), "Lesson catalog ready");

    let sync = build_sync_client(&config, store.clone());
    let engine = Arc::new(ProgressEngine::new(
        store.clone(),
        catalog,
        config.progress.clone(),
        Arc::new(SystemClock),
        sync.clone(),
    ));
    engine.startup_checks().await?;

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(
        store.clone(),
        engine.clone(),
        sync.clone(),
        &config,
        shutdown_tx.clone(),
    );

    if config.worker.enabled {
        let worker_manager =
            WorkerManager::new(engine, sync, shutdown_tx.subscribe(), &config.worker);
        tokio::spawn(async move {
            if let Err(e) = worker_manager.start().await {
                tracing::error!(error = %e, "Worker manager failed");
            }
        });
    }

    let app = build_router(state)
        .layer(build_cors_layer(&config)?)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
    {
        tracing::error!(error = %e, "HTTP server crashed");
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_sync_client(config: &Config, store: Arc<Store>) -> Option<Arc<SyncClient>> {
    if !config.sync.enabled {
        tracing::info!("Remote sync disabled");
        return None;
    }
    match HttpTransport::new(&config.sync) {
        Ok(transport) => {
            tracing::info!(base_url = %config.sync.base_url, "Remote sync enabled");
            Some(Arc::new(SyncClient::new(store, Arc::new(transport))))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Remote sync misconfigured, running offline only");
            None
        }
    }
}

fn build_cors_layer(config: &Config) -> Result<CorsLayer, BoxError> {
    let layer = CorsLayer::new()
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_methods(Any);

    if config.cors_origin.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }
    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| format!("invalid CORS_ORIGIN '{}': {e}", config.cors_origin))?;
    Ok(layer.allow_origin(origin))
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
