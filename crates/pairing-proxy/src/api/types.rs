//! API request and response types.

use crate::coordinator::LifecycleState;
use serde::{Deserialize, Serialize};

/// Query string of `GET /pair`.
#[derive(Debug, Deserialize)]
pub struct PairQuery {
    /// Phone number to pair
    pub code: Option<String>,
}

/// Pairing code for the caller to enter on their device.
#[derive(Debug, Serialize)]
pub struct PairResponse {
    pub code: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub state: LifecycleState,
    pub session_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_healthy: Option<bool>,
    pub checked_at: String,
}
