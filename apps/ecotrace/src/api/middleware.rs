//! Request throttling.
//!
//! One process-wide token bucket in front of every route.
//! `ECOTRACE_RATE_LIMIT` sets the refill rate in requests per second
//! (default 100); `0` switches throttling off.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

const DEFAULT_RPS: NonZeroU32 = NonZeroU32::new(100).unwrap();

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Resolve the limiter from `ECOTRACE_RATE_LIMIT`.
///
/// `None` means throttling is off; an unset or unparseable value falls back
/// to the default rate.
#[must_use]
pub fn rate_limiter_from_env() -> Option<GlobalRateLimiter> {
    let configured = std::env::var("ECOTRACE_RATE_LIMIT")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok());
    match configured {
        Some(0) => None,
        Some(rps) => Some(rate_limiter(NonZeroU32::new(rps).unwrap_or(DEFAULT_RPS))),
        None => Some(rate_limiter(DEFAULT_RPS)),
    }
}

fn rate_limiter(rps: NonZeroU32) -> GlobalRateLimiter {
    Arc::new(RateLimiter::direct(Quota::per_second(rps)))
}

/// Refuse requests with 429 once the bucket is drained.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if limiter.check().is_err() {
        tracing::warn!(event = "rate_limited", "request refused");
        return Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"));
    }
    Ok(next.run(request).await)
}

// =============================================================================
// TESTS
// =============================================================================
