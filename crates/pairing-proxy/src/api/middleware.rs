//! Rate limiting and request logging.

use crate::error::ProxyError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{num::NonZeroU32, sync::Arc};
use tracing::{debug, warn};

/// Quota used when none is configured.
const DEFAULT_PER_MINUTE: u32 = 10;

/// Global rate limiter (not keyed by caller).
pub type GlobalLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Pairing request quota shared across requests.
#[derive(Clone)]
pub struct RateLimitState {
    pub global: Arc<GlobalLimiter>,
}

impl RateLimitState {
    /// Allow `requests_per_minute` pairing requests (10 if zero).
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute)
            .or(NonZeroU32::new(DEFAULT_PER_MINUTE))
            .unwrap_or(NonZeroU32::MIN);

        Self {
            global: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    /// Create a permissive rate limiter for testing.
    pub fn permissive() -> Self {
        Self::new(1000)
    }
}

/// Reject pairing requests over quota with 429.
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, ProxyError> {
    if rate_limit.global.check().is_err() {
        warn!("Pairing rate limit exceeded");
        return Err(ProxyError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}

/// Log method, path, status and latency. The query string is left out
/// because it carries the phone number.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_success() {
        debug!(%method, %path, %status, ?duration, "Request completed");
    } else {
        warn!(%method, %path, %status, ?duration, "Request failed");
    }

    response
}
