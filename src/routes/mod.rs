pub mod challenges;
pub mod events;
pub mod health;
pub mod import;
pub mod leaderboard;
pub mod lessons;
pub mod profile;
pub mod sessions;
pub mod sync;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::services::{ServeDir, ServeFile};

use crate::middleware::request_id;
use crate::state::AppState;

/// Maximum request body size: 1 MiB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/profile", profile::router())
        .nest("/lessons", lessons::router())
        .nest("/challenges", challenges::router())
        .nest("/sessions", sessions::router())
        .nest("/leaderboard", leaderboard::router())
        .nest("/events", events::router())
        .nest("/sync", sync::router())
        .nest("/import", import::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    let static_dir = state.config().static_dir.clone();
    let index = format!("{}/index.html", static_dir.trim_end_matches('/'));
    let spa_fallback = ServeDir::new(&static_dir).not_found_service(ServeFile::new(index));

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::router())
        .fallback_service(spa_fallback)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}
