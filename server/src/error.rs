//! Structured error reporting shared by HTTP responses and stream chunks.
//!
//! DESIGN
//! ======
//! Every error enum in the server implements [`ErrorCode`]: a grepable
//! `E_*` code and a retryable flag. Before the response stream opens, errors
//! become a JSON body via [`ApiError`]; afterwards they become a terminal
//! [`Chunk::Error`] via [`error_chunk`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use protocol::Chunk;
use serde::Serialize;

/// Grepable error code and retryable flag for structured error payloads.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// JSON error body returned before any stream is opened.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, err: &(impl ErrorCode + ?Sized)) -> Self {
        Self { status, code: err.error_code(), message: err.to_string(), retryable: err.retryable() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Terminal stream chunk describing an error after streaming started.
#[must_use]
pub fn error_chunk(err: &(impl ErrorCode + ?Sized)) -> Chunk {
    Chunk::Error { error_text: format!("{}: {err}", err.error_code()) }
}
