use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/local-storage", post(import_local_storage))
}

/// Browser storage values are strings; non-string JSON values are stored as
/// their JSON text, which is what the browser would have held.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct LocalStorageDump(BTreeMap<String, Value>);

async fn import_local_storage(
    State(state): State<AppState>,
    JsonBody(dump): JsonBody<LocalStorageDump>,
) -> Result<impl IntoResponse, AppError> {
    let raw: BTreeMap<String, String> = dump
        .0
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect();

    let (written, profile) = state.engine().import_local_storage(&raw).await?;
    tracing::info!(received = raw.len(), written, "Legacy storage imported");
    Ok(ok(serde_json::json!({
        "written": written,
        "profile": profile,
    })))
}
