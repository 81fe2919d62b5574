use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use crate::extractors::PathParam;
use crate::response::{created, ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_lessons))
        .route("/:id/start", post(start_lesson))
}

async fn list_lessons(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let lessons = state.engine().lessons_overview().await?;
    Ok(ok(lessons))
}

async fn start_lesson(
    State(state): State<AppState>,
    PathParam(lesson_id): PathParam<u32>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.engine().start_lesson(lesson_id).await?;
    Ok(created(view))
}
