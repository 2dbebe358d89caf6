/// Error types for the ML backend service.

use crate::postprocess::detection::NormalizeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("Image fetch error: {0}")]
    ImageFetch(String),
    #[error("Detector error: {0}")]
    Detector(String),
    #[error("Invalid detector output: {0}")]
    InvalidDetections(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("IO error: {err}"))
    }
}

impl From<NormalizeError> for AppError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::InvalidInput(msg) => AppError::InvalidDetections(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::ImageDecode(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ImageFetch(_) | AppError::Detector(_) | AppError::InvalidDetections(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.to_string();

        tracing::error!(status = status.as_u16(), "{message}");

        let body = json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
