use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use crate::extractors::JsonBody;
use crate::progress::engine::IdentityUpdate;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_profile).patch(update_identity))
        .route("/hearts/purchase", post(purchase_hearts))
}

async fn get_profile(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.engine().profile().await?;
    Ok(ok(snapshot))
}

async fn update_identity(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<IdentityUpdate>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(email) = req.email.as_deref().map(str::trim) {
        if !email.is_empty() && !email.contains('@') {
            return Err(AppError::bad_request("INVALID_EMAIL", "Invalid email address"));
        }
    }
    let snapshot = state.engine().update_identity(req).await?;
    Ok(ok(snapshot))
}

async fn purchase_hearts() -> AppError {
    AppError::not_implemented("Heart purchases are not available")
}
