//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use weft_engine::EngineError;

use crate::service::pipeline::PipelineError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::RunNotFound(_) | EngineError::PipelineNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            EngineError::RunTerminal(_) => ApiError::Conflict(err.to_string()),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(name) => {
                ApiError::NotFound(format!("pipeline {} not exists", name))
            }
            PipelineError::ValidationError(msg) => ApiError::BadRequest(msg),
            PipelineError::Engine(err) => err.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
