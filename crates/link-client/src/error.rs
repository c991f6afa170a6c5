//! Link client errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Pairing failed: {0}")]
    Pairing(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

impl LinkError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LinkError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LinkError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
