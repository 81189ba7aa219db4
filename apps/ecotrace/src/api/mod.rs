//! # Ecotrace HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `POST /emissions` - Record an emission (carbon derived server-side)
//! - `GET /emissions` - List the caller's records (filter + pagination)
//! - `GET /emissions/stats` - Statistics for a time window
//! - `GET /emissions/{id}` - Fetch one record
//! - `PUT /emissions/{id}` - Partial update
//! - `DELETE /emissions/{id}` - Delete a record
//! - `GET /factors` - Dump the resolved factor table
//! - `GET /ws` - WebSocket notification channel (authenticated via `?token=`)
//! - `GET /health` - Health check (unauthenticated)
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `ECOTRACE_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `ECOTRACE_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `ECOTRACE_API_TOKENS`: Comma-separated `token:user_id` pairs; unset means ALL requests refused

mod auth;
mod handlers;
mod middleware;
mod types;
mod ws;

// Re-exports for external use
pub use auth::{AuthUser, TokenMap};
pub use middleware::rate_limiter_from_env;
pub use ws::NotificationHub;
// Re-export handlers and types for integration tests (via `ecotrace::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    create_emission_handler, delete_emission_handler, factors_handler, get_emission_handler,
    health_handler, list_emissions_handler, stats_handler, update_emission_handler,
};
#[allow(unused_imports)]
pub use types::{
    BreakdownJson, EmissionJson, EmissionRequest, EmissionResponse, EmissionUpdateRequest,
    EventFrame, FactorsResponse, GreetingFrame, HealthResponse, ListResponse, StatsResponse,
    status_for,
};

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, Uri, header},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use ecotrace_core::{EcotraceError, Engine};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the accounting engine, the notification hub, and the
/// resolved credential map.
#[derive(Clone)]
pub struct AppState {
    /// The engine holding the record store and ledger.
    pub engine: Arc<RwLock<Engine>>,
    /// Per-user broadcast rooms for change notifications.
    pub hub: NotificationHub,
    /// Token -> user map, resolved once at router creation.
    pub tokens: Arc<TokenMap>,
}

impl AppState {
    /// Create new app state over an engine, reading credentials from the
    /// environment.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self::with_tokens(engine, TokenMap::from_env())
    }

    /// Create new app state with an explicit credential map.
    #[must_use]
    pub fn with_tokens(engine: Engine, tokens: TokenMap) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            hub: NotificationHub::new(),
            tokens: Arc::new(tokens),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `ECOTRACE_CORS_ORIGINS` environment variable:
/// - If "*": allows all origins (development mode - use with caution!)
/// - If not set: defaults to localhost only (restrictive default)
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("ECOTRACE_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (ECOTRACE_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in ECOTRACE_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No ECOTRACE_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. CORS - handles preflight requests
/// 2. Tracing - logs all requests
/// 3. Rate Limiting - protects against DoS (if enabled)
/// 4. Authentication - resolves bearer tokens to users (always on;
///    an empty token map means every authenticated route is refused)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limiter = rate_limiter_from_env();
    match &rate_limiter {
        Some(_) => tracing::info!("Request throttling enabled"),
        None => tracing::info!("Request throttling disabled (ECOTRACE_RATE_LIMIT=0)"),
    }

    if state.tokens.is_empty() {
        tracing::warn!(
            "⚠️  No API tokens configured - every request except /health will be refused! \
             Set ECOTRACE_API_TOKENS (token:user_id pairs) to admit clients."
        );
    } else {
        tracing::info!("Bearer token authentication enabled");
    }

    // Build base router with routes
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/emissions", post(handlers::create_emission_handler))
        .route("/emissions", get(handlers::list_emissions_handler))
        .route("/emissions/stats", get(handlers::stats_handler))
        .route("/emissions/{id}", get(handlers::get_emission_handler))
        .route("/emissions/{id}", put(handlers::update_emission_handler))
        .route("/emissions/{id}", delete(handlers::delete_emission_handler))
        .route("/factors", get(handlers::factors_handler))
        .route("/ws", get(ws::ws_handler));

    // Apply authentication middleware (innermost - runs last on request).
    // /health and /ws bypass it inside the middleware; the WS handshake
    // authenticates its own query token.
    router = router.layer(axum_middleware::from_fn_with_state(
        state.clone(),
        auth::bearer_auth_middleware,
    ));

    // Apply rate limiting middleware
    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    // Apply CORS, body limit, and tracing (outermost layers)
    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

/// The `/ws` credential rides the query string, so request spans record the
/// path only, never the full URI.
fn request_span(request: &Request<Body>) -> tracing::Span {
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        path = loggable_target(request.uri()),
    )
}

fn loggable_target(uri: &Uri) -> &str {
    uri.path()
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, engine: Engine) -> Result<(), EcotraceError> {
    let state = AppState::new(engine);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| EcotraceError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("Ecotrace HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| EcotraceError::Io(format!("Server error: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================
