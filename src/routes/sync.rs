use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::sync::{SyncClient, SyncError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_status))
        .route("/online", post(go_online))
        .route("/offline", post(go_offline))
        .route("/replay", post(replay))
}

fn client(state: &AppState) -> Result<Arc<SyncClient>, AppError> {
    state
        .sync()
        .cloned()
        .ok_or_else(|| AppError::service_unavailable("SYNC_DISABLED", "Remote sync is disabled"))
}

impl From<SyncError> for AppError {
    fn from(value: SyncError) -> Self {
        match value {
            SyncError::Store(e) => e.into(),
            other => AppError::internal(&other.to_string()),
        }
    }
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.sync() {
        Some(sync) => {
            let status = sync.status();
            ok(json!({ "enabled": true, "online": status.online, "pending": status.pending }))
        }
        None => ok(json!({ "enabled": false, "online": false, "pending": 0 })),
    }
}

async fn go_online(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let sync = client(&state)?;
    let replay = sync.set_online(true).await?;
    Ok(ok(json!({ "status": sync.status(), "replay": replay })))
}

async fn go_offline(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let sync = client(&state)?;
    sync.set_online(false).await?;
    Ok(ok(sync.status()))
}

async fn replay(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let sync = client(&state)?;
    let report = sync.replay().await?;
    Ok(ok(report))
}
