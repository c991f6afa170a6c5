//! Error types for the pairing proxy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the request gate and the HTTP layer.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Phone number is required")]
    MissingPhoneNumber,

    #[error("Session directory already holds a linked device")]
    AlreadyLinked,

    #[error("Link engine error: {0}")]
    Link(#[from] link_client::LinkError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Internal error")]
    Internal,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub code: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ProxyError::MissingPhoneNumber => {
                (StatusCode::IM_A_TEAPOT, "PHONE_NUMBER_REQUIRED")
            }
            ProxyError::AlreadyLinked => (StatusCode::CONFLICT, "ALREADY_LINKED"),
            ProxyError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
            // Engine and storage details stay in the logs
            ProxyError::Link(_) | ProxyError::Storage(_) | ProxyError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = match &self {
            ProxyError::MissingPhoneNumber => ErrorResponse {
                error: None,
                message: Some(self.to_string()),
                code: code.to_string(),
            },
            ProxyError::Link(_) | ProxyError::Storage(_) => ErrorResponse {
                error: Some(ProxyError::Internal.to_string()),
                message: None,
                code: code.to_string(),
            },
            _ => ErrorResponse {
                error: Some(self.to_string()),
                message: None,
                code: code.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(e: std::io::Error) -> Self {
        ProxyError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(e: serde_json::Error) -> Self {
        ProxyError::Storage(format!("JSON serialization error: {}", e))
    }
}

/// Upload collaborator failures. Never fatal to the lifecycle.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to read credential file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload rejected: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed upload result: {0}")]
    Malformed(String),
}

/// Teardown failures. Logged and swallowed.
#[derive(Debug, Error)]
pub enum TeardownError {
    #[error("Failed to end session: {0}")]
    End(#[from] link_client::LinkError),

    #[error("Failed to wipe session directory: {0}")]
    Wipe(#[from] std::io::Error),
}
