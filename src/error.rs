//! Request-level error taxonomy and its HTTP boundary mapping.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed client input. Detected before any external call.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Expected board/column/relation not found. Operator problem, not retryable.
    #[error("board setup: {0}")]
    Configuration(String),
    /// Network failure or malformed payload talking to an external service.
    #[error("transport: {0}")]
    Transport(String),
    /// The monday API answered with a structured `errors` envelope.
    #[error("monday api error ({label}): {errors}")]
    Api {
        label: String,
        errors: serde_json::Value,
    },
    /// One attachment failed; remaining uploads for the submission are aborted.
    #[error("upload of '{filename}' failed: {details}")]
    Upload { filename: String, details: String },
    /// Session token missing or rejected by the identity provider.
    #[error("{0}")]
    Auth(&'static str),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

/// Convert into the client-facing response. Internal details (API payloads,
/// transport errors) are logged here and never echoed to the client.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            Error::Auth(msg) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": msg }))).into_response()
            }
            err => {
                tracing::error!(?err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Interner Serverfehler" })),
                )
                    .into_response()
            }
        }
    }
}
