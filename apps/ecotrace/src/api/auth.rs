//! # Authentication Module
//!
//! Bearer-token authentication for the Ecotrace HTTP API. The identity
//! provider is reduced to a verified token -> user map: operations trust the
//! resolved `UserId` and the core never sees a credential.
//!
//! ## Configuration
//!
//! - `ECOTRACE_API_TOKENS`: comma-separated `token:user_id` pairs, e.g.
//!   `alice-secret:1,bob-secret:2`
//!
//! If the variable is unset or holds no valid pairs, the API fails CLOSED:
//! every request except `/health` is refused.
//!
//! ## Usage
//!
//! Send the token in the Authorization header:
//! ```text
//! Authorization: Bearer <your-token>
//! ```
//! WebSocket clients pass it as a `?token=` query parameter instead, since
//! browsers cannot set headers on an upgrade request.

use super::AppState;
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use ecotrace_core::UserId;
use subtle::ConstantTimeEq;

// =============================================================================
// TOKEN MAP
// =============================================================================

/// The resolved token -> user map, built once at router creation.
#[derive(Debug, Clone, Default)]
pub struct TokenMap {
    entries: Vec<(String, UserId)>,
}

impl TokenMap {
    /// Build a map from explicit pairs (tests and embedders).
    #[must_use]
    pub fn new(pairs: impl IntoIterator<Item = (String, UserId)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    /// Parse `ECOTRACE_API_TOKENS` (`token:user_id` pairs, comma-separated).
    /// Malformed pairs are skipped with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let Ok(raw) = std::env::var("ECOTRACE_API_TOKENS") else {
            return Self::default();
        };
        let mut entries = Vec::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match pair.rsplit_once(':') {
                Some((token, user)) if !token.is_empty() => match user.parse::<u64>() {
                    Ok(user_id) => entries.push((token.to_string(), UserId(user_id))),
                    Err(_) => {
                        tracing::warn!(
                            event = "token_config",
                            "Skipping ECOTRACE_API_TOKENS entry with non-numeric user id"
                        );
                    }
                },
                _ => {
                    tracing::warn!(
                        event = "token_config",
                        "Skipping malformed ECOTRACE_API_TOKENS entry (expected token:user_id)"
                    );
                }
            }
        }
        Self { entries }
    }

    /// Whether any credentials are configured at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a presented token to a user.
    ///
    /// Every configured token is compared in constant time over padded
    /// buffers, so neither match position nor token length leaks through
    /// timing.
    #[must_use]
    pub fn resolve(&self, presented: &str) -> Option<UserId> {
        let presented_bytes = presented.as_bytes();
        let mut resolved = None;
        for (token, user) in &self.entries {
            let expected_bytes = token.as_bytes();
            let max_len = presented_bytes.len().max(expected_bytes.len());
            let mut padded_presented = vec![0u8; max_len];
            let mut padded_expected = vec![0u8; max_len];
            padded_presented[..presented_bytes.len()].copy_from_slice(presented_bytes);
            padded_expected[..expected_bytes.len()].copy_from_slice(expected_bytes);

            let bytes_match: bool = padded_presented.ct_eq(&padded_expected).into();
            if bytes_match && presented_bytes.len() == expected_bytes.len() {
                resolved = Some(*user);
            }
        }
        resolved
    }
}

/// The authenticated caller, injected as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

// =============================================================================
// BEARER TOKEN MIDDLEWARE
// =============================================================================

/// Bearer-token authentication middleware.
///
/// - `/health` is always allowed (for load balancer health checks)
/// - `/ws` is passed through; the WebSocket handshake authenticates its own
///   `?token=` query parameter through the same `TokenMap`
/// - All other endpoints require `Authorization: Bearer <token>` resolving
///   to a configured user
pub async fn bearer_auth_middleware(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let path = request.uri().path();
    if path == "/health" || path == "/ws" {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header_value) => {
            // Support both "Bearer <token>" and raw "<token>" formats
            let token = header_value.strip_prefix("Bearer ").unwrap_or(header_value);
            match state.tokens.resolve(token) {
                Some(user) => {
                    request.extensions_mut().insert(AuthUser(user));
                    Ok(next.run(request).await)
                }
                None => {
                    tracing::warn!(
                        event = "auth_failure",
                        reason = "invalid_token",
                        "Authentication failed: invalid bearer token"
                    );
                    Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
                }
            }
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
