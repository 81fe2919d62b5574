use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use crate::extractors::PathParam;
use crate::progress::challenge::BUILTIN_CHALLENGES;
use crate::response::{created, ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_challenges))
        .route("/:id/start", post(start_challenge))
}

async fn list_challenges() -> impl IntoResponse {
    ok(BUILTIN_CHALLENGES.as_slice())
}

async fn start_challenge(
    State(state): State<AppState>,
    PathParam(challenge_id): PathParam<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.engine().start_challenge(&challenge_id).await?;
    Ok(created(view))
}
