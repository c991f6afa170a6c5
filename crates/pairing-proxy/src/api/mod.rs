//! HTTP API for the pairing proxy.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::{logging_middleware, rate_limit_middleware, RateLimitState};
pub use types::*;

use crate::coordinator::Coordinator;
use crate::gate::RequestGate;
use axum::{middleware as axum_middleware, routing::get, Router};
use link_client::BridgeClient;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Serializes pairing requests
    pub gate: Arc<RequestGate>,
    /// Lifecycle owner, for status reporting
    pub coordinator: Coordinator,
    /// Bridge client, when health checks should reach it
    pub bridge: Option<BridgeClient>,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            gate: Arc::new(RequestGate::new(coordinator.clone())),
            coordinator,
            bridge: None,
        }
    }

    pub fn with_bridge(mut self, bridge: BridgeClient) -> Self {
        self.bridge = Some(bridge);
        self
    }
}

/// Create the API router.
///
/// Unmatched paths fall through to `static_dir` when one is given.
pub fn create_router(
    state: AppState,
    rate_limit: RateLimitState,
    static_dir: Option<PathBuf>,
) -> Router {
    let pairing = Router::new()
        .route("/pair", get(handlers::pair))
        .route_layer(axum_middleware::from_fn_with_state(
            rate_limit,
            rate_limit_middleware,
        ));

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .merge(pairing);

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
