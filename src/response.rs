use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::progress::catalog::CatalogError;
use crate::progress::session::SessionError;
use crate::progress::ProgressError;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl AppError {
    fn operational(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn bad_request(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn forbidden(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::FORBIDDEN, code, message)
    }

    pub fn conflict(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::CONFLICT, code, message)
    }

    pub fn not_implemented(message: &str) -> Self {
        Self::operational(StatusCode::NOT_IMPLEMENTED, "NOT_IMPLEMENTED", message)
    }

    pub fn service_unavailable(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.to_string(),
            is_operational: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            self.message.clone()
        } else {
            "服务器内部错误".to_string()
        };

        if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Internal API error");
        }

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: exposed_message,
                trace_id: None,
            }),
        )
            .into_response()
    }
}

// StoreError 映射：Validation -> 400，其余 -> 500（消息在响应中被替换）
impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match &value {
            StoreError::Validation(msg) => AppError::bad_request("VALIDATION_ERROR", msg),
            _ => AppError::internal(&value.to_string()),
        }
    }
}

impl From<ProgressError> for AppError {
    fn from(value: ProgressError) -> Self {
        match value {
            ProgressError::Store(e) => e.into(),
            ProgressError::Catalog(CatalogError::NotFound(id)) => {
                AppError::not_found(&format!("Lesson {id} not found"))
            }
            // 具体原因已在目录加载时记录，这里只返回通用提示
            ProgressError::Catalog(CatalogError::ContentUnavailable(_)) => {
                AppError::service_unavailable(
                    "CONTENT_UNAVAILABLE",
                    "This lesson is temporarily unavailable",
                )
            }
            ProgressError::Catalog(e) => AppError::internal(&e.to_string()),
            ProgressError::LessonLocked(id) => AppError::forbidden(
                "LESSON_LOCKED",
                &format!("Complete lesson {} first", id.saturating_sub(1)),
            ),
            ProgressError::NoHearts => {
                AppError::forbidden("NO_HEARTS", "No hearts left, wait for one to regenerate")
            }
            ProgressError::ChallengeNotFound(id) => {
                AppError::not_found(&format!("Challenge {id} not found"))
            }
            ProgressError::NoChallengeContent(_) => AppError::service_unavailable(
                "CONTENT_UNAVAILABLE",
                "No exercises available for this challenge",
            ),
            ProgressError::SessionNotFound(_) => AppError::not_found("Session not found"),
            ProgressError::Session(SessionError::AlreadyCompleted) => {
                AppError::conflict("SESSION_COMPLETED", "Session already completed")
            }
            ProgressError::Session(SessionError::InputMismatch(kind)) => AppError::bad_request(
                "INPUT_MISMATCH",
                &format!("Answer shape does not fit a {} exercise", kind.as_str()),
            ),
            ProgressError::Session(SessionError::Expired) => {
                AppError::conflict("SESSION_EXPIRED", "Time limit exceeded")
            }
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}
