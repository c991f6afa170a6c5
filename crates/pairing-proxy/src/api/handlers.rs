//! HTTP request handlers.

use super::types::{HealthResponse, PairQuery, PairResponse};
use super::AppState;
use crate::error::ProxyError;
use axum::{
    extract::{Query, State},
    Json,
};

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let bridge_healthy = match &state.bridge {
        Some(bridge) => Some(bridge.health_check().await),
        None => None,
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        state: state.coordinator.state(),
        session_active: state.coordinator.has_session().await,
        bridge_healthy,
        checked_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Request a pairing code for a phone number.
pub async fn pair(
    State(state): State<AppState>,
    Query(query): Query<PairQuery>,
) -> Result<Json<PairResponse>, ProxyError> {
    let code = state.gate.submit(query.code.as_deref()).await?;
    Ok(Json(PairResponse { code }))
}
