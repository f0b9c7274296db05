//! Engine-wide error type and its HTTP mapping
//!
//! Variants follow an error-kind taxonomy by shape, not name:
//! `BadRequest` is `InputInvalid`, `Internal` doubles as `Fatal` for
//! unrecoverable startup conditions raised after the server is already
//! serving requests. `Transient` never reaches here — the Job Scheduler
//! and analyzer client retry it locally and only report `Unavailable`
//! (folded into `Internal`) once attempts are exhausted.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Infeasible plan ({reason}): {message}")]
    InfeasiblePlan { reason: &'static str, message: String },

    #[error("Export format error: {0}")]
    ExportFormatError(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),

    #[error("Store error: {0}")]
    Store(#[from] djprep_common::Error),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            EngineError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            EngineError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INPUT_INVALID", msg),
            EngineError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            EngineError::InfeasiblePlan { reason, message } => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({
                        "error": {
                            "code": "INFEASIBLE_PLAN",
                            "reason": reason,
                            "message": message,
                        }
                    })),
                )
                    .into_response();
            }
            EngineError::ExportFormatError(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "EXPORT_FORMAT_ERROR", msg)
            }
            EngineError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            EngineError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            EngineError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            EngineError::Store(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
