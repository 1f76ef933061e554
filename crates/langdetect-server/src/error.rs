//! HTTP error responses

use crate::pipeline::RejectionReason;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use langdetect_core::Error;
use serde_json::json;

/// Errors returned from handlers as `{success: false, error}`
#[derive(Debug)]
pub enum AppError {
    /// Input failed validation
    Validation(String),
    /// Engine failed on a single-text request
    Detection(String),
    NotFound,
    Internal,
}

impl AppError {
    /// Failure of the blocking engine task for a single-text request
    pub fn detection(err: Error) -> Self {
        match err {
            Error::Internal(_) => Self::Internal,
            other => Self::Detection(other.detail()),
        }
    }
}

impl From<RejectionReason> for AppError {
    fn from(reason: RejectionReason) -> Self {
        AppError::Validation(reason.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Detection(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error detecting language: {}", msg),
            ),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = json!({
            "success": false,
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
