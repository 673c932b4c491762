use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;
use thiserror::Error;

/// Failures of the CSV engine that abort a whole operation.
///
/// Per-column problems never show up here; the analyzer degrades those
/// fields in place instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Malformed input at line {line}: {reason}")]
    MalformedInput { line: u64, reason: String },

    #[error("CSV file is empty")]
    EmptyInput,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DataFrame error: {0}")]
    Frame(#[from] polars::error::PolarsError),

    #[error("CSV write error: {0}")]
    Csv(String),
}

impl EngineError {
    pub(crate) fn malformed(line: u64, reason: impl Into<String>) -> Self {
        EngineError::MalformedInput { line, reason: reason.into() }
    }
}

impl EngineError {
    /// Output-side CSV failure. Never `MalformedInput`: the input was fine.
    pub(crate) fn from_write(err: csv::Error) -> Self {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => EngineError::Io(io),
            other => EngineError::Csv(format!("{:?}", other)),
        }
    }
}

/// Read-side conversion: anything but IO is a problem with the input file.
impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            return match err.into_kind() {
                csv::ErrorKind::Io(io) => EngineError::Io(io),
                other => EngineError::Csv(format!("{:?}", other)),
            };
        }
        let line = err.position().map_or(0, |p| p.line());
        EngineError::MalformedInput { line, reason: err.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Engine(err @ EngineError::EmptyInput) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::Engine(err @ EngineError::MalformedInput { .. }) => {
                (StatusCode::BAD_REQUEST, format!("Invalid CSV format: {}", err))
            }
            AppError::Engine(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Analysis failed: {}", err)),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
