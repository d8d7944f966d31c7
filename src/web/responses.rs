//! Standard JSON envelopes for the control-plane HTTP API, grounded in
//! the teacher's `ApiResponse<T>` wrapper (`web/responses.rs`), trimmed to
//! what this surface's handlers actually return.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::errors::AppError;

/// A handler-level error paired with the HTTP status it should produce.
/// §7's taxonomy maps `Validation`/`Precondition`/`Config::Validation` to
/// 400-class responses; everything else surfaces as 500.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = if err.is_caller_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

pub fn ok<T: Serialize>(value: T) -> Response {
    Json(value).into_response()
}
