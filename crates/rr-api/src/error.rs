//! HTTP mapping of `AppError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rr_core::AppError;
use serde_json::json;

/// An `AppError` on its way out as a JSON `{"error": "..."}` response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// For the vote and comment endpoints, where an unresolvable id is a bad request.
    pub fn missing_as_bad_request(err: AppError) -> Self {
        match err {
            AppError::NotFound(..) => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            other => other.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = match &err {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(..) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Render(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
            "Internal server error".to_string()
        } else {
            match err {
                AppError::ValidationError(msg) | AppError::Unauthorized(msg) | AppError::Conflict(msg) => msg,
                other => other.to_string(),
            }
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
