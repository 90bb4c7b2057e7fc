//! Domain-specific error types for technique-rag

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Main error type for the technique-rag analysis service
#[derive(Error, Debug)]
pub enum TechniqueRagError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Analysis error: {message}")]
    Analysis { message: String },

    #[error("Response format error: {message}")]
    ResponseFormat { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<anyhow::Error> for TechniqueRagError {
    fn from(err: anyhow::Error) -> Self {
        TechniqueRagError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TechniqueRagError {
    fn from(err: serde_json::Error) -> Self {
        TechniqueRagError::ResponseFormat {
            message: err.to_string(),
        }
    }
}

/// Convert TechniqueRagError to an HTTP response.
///
/// Caller-visible bodies are fixed strings; the `message` field carries
/// operator diagnostics and is logged at the failure site, never serialized
/// to the caller.
impl IntoResponse for TechniqueRagError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            TechniqueRagError::Validation { .. } => (StatusCode::BAD_REQUEST, "Text is required"),
            TechniqueRagError::Analysis { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ML analysis failed")
            }
            TechniqueRagError::ResponseFormat { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid ML response")
            }
            TechniqueRagError::Config { .. } | TechniqueRagError::Internal { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            json!({ "error": body }).to_string(),
        )
            .into_response()
    }
}

/// Result type alias for technique-rag operations
pub type Result<T> = std::result::Result<T, TechniqueRagError>;
