use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use crate::extractors::{JsonBody, PathParam};
use crate::progress::session::AnswerInput;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_session).delete(abandon_session))
        .route("/:id/answers", post(submit_answer))
}

async fn get_session(
    State(state): State<AppState>,
    PathParam(session_id): PathParam<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.engine().session_view(&session_id).await?;
    Ok(ok(view))
}

async fn submit_answer(
    State(state): State<AppState>,
    PathParam(session_id): PathParam<String>,
    JsonBody(input): JsonBody<AnswerInput>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.engine().submit_answer(&session_id, &input).await?;
    Ok(ok(response))
}

async fn abandon_session(
    State(state): State<AppState>,
    PathParam(session_id): PathParam<String>,
) -> Result<StatusCode, AppError> {
    state.engine().abandon_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
