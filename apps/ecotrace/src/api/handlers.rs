//! # API Endpoint Handlers
//!
//! HTTP endpoint handlers over the accounting engine.
//!
//! Mutation handlers publish their change event to the notification hub
//! BEFORE the engine write lock is released, which pins per-user delivery
//! order to commit order.

use super::{
    AppState,
    auth::AuthUser,
    types::{
        EmissionRequest, EmissionResponse, EmissionUpdateRequest, FactorsResponse, HealthResponse,
        ListQuery, ListResponse, StatsQuery, StatsResponse, status_for,
    },
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use ecotrace_core::{EcotraceError, Pagination, RecordFilter, RecordId, TimeRange};

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// EMISSION HANDLERS
// =============================================================================

/// `POST /emissions` — record an emission; carbon is derived server-side.
pub async fn create_emission_handler(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(request): Json<EmissionRequest>,
) -> impl IntoResponse {
    let new = match request.to_new_emission(user, Utc::now()) {
        Ok(new) => new,
        Err(e) => {
            return (status_for(&e), Json(EmissionResponse::error(e.to_string())));
        }
    };

    let mut engine = state.engine.write().await;
    match engine.create(new) {
        Ok((record, event)) => {
            // Publish under the write lock: commit order == delivery order.
            state.hub.publish(&event);
            (
                StatusCode::CREATED,
                Json(EmissionResponse::committed(&record, &event)),
            )
        }
        Err(e) => (status_for(&e), Json(EmissionResponse::error(e.to_string()))),
    }
}

/// `GET /emissions` — list the caller's records, newest first.
pub async fn list_emissions_handler(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let category = match query.category.as_deref() {
        Some(raw) => match ecotrace_core::Category::parse(raw) {
            Some(category) => Some(category),
            None => {
                let e = EcotraceError::validation("category", format!("unknown category '{raw}'"));
                return (status_for(&e), Json(ListResponse::error(e.to_string())));
            }
        },
        None => None,
    };
    let filter = RecordFilter {
        category,
        start: query.start,
        end: query.end,
    };
    let pagination = Pagination {
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(Pagination::default().limit),
    };

    let engine = state.engine.read().await;
    match engine.list(user, &filter, pagination) {
        Ok(page) => (StatusCode::OK, Json(ListResponse::ok(&page))),
        Err(e) => (status_for(&e), Json(ListResponse::error(e.to_string()))),
    }
}

/// `GET /emissions/stats` — summary for a named or explicit window.
pub async fn stats_handler(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<StatsQuery>,
) -> impl IntoResponse {
    let range = if query.start.is_some() || query.end.is_some() {
        TimeRange::Between {
            start: query.start.unwrap_or(i64::MIN),
            end: query.end.unwrap_or(i64::MAX),
        }
    } else {
        let name = query.range.as_deref().unwrap_or("all");
        match TimeRange::parse(name) {
            Some(range) => range,
            None => {
                let e = EcotraceError::validation(
                    "range",
                    format!("unknown range '{name}' (expected all, week, month, or year)"),
                );
                return (status_for(&e), Json(StatsResponse::error(e.to_string())));
            }
        }
    };

    let engine = state.engine.read().await;
    match engine.stats(user, &range, Utc::now()) {
        Ok(summary) => (StatusCode::OK, Json(StatsResponse::ok(&summary))),
        Err(e) => (status_for(&e), Json(StatsResponse::error(e.to_string()))),
    }
}

/// `GET /emissions/{id}` — fetch one record. A foreign or missing id is the
/// same 404.
pub async fn get_emission_handler(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let engine = state.engine.read().await;
    match engine.get(RecordId(id), user) {
        Ok(record) => (StatusCode::OK, Json(EmissionResponse::found(&record))),
        Err(e) => (status_for(&e), Json(EmissionResponse::error(e.to_string()))),
    }
}

/// `PUT /emissions/{id}` — partial update; carbon is recomputed when the
/// category, subcategory, or amount changes.
pub async fn update_emission_handler(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<u64>,
    Json(request): Json<EmissionUpdateRequest>,
) -> impl IntoResponse {
    let patch = match request.to_patch() {
        Ok(patch) => patch,
        Err(e) => {
            return (status_for(&e), Json(EmissionResponse::error(e.to_string())));
        }
    };

    let mut engine = state.engine.write().await;
    match engine.update(RecordId(id), user, patch) {
        Ok((record, event)) => {
            state.hub.publish(&event);
            (
                StatusCode::OK,
                Json(EmissionResponse::committed(&record, &event)),
            )
        }
        Err(e) => (status_for(&e), Json(EmissionResponse::error(e.to_string()))),
    }
}

/// `DELETE /emissions/{id}` — remove a record, subtracting its carbon.
pub async fn delete_emission_handler(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let mut engine = state.engine.write().await;
    match engine.delete(RecordId(id), user) {
        Ok((record, event)) => {
            state.hub.publish(&event);
            (
                StatusCode::OK,
                Json(EmissionResponse::committed(&record, &event)),
            )
        }
        Err(e) => (status_for(&e), Json(EmissionResponse::error(e.to_string()))),
    }
}

// =============================================================================
// FACTORS HANDLER
// =============================================================================

/// `GET /factors` — dump the resolved factor table.
pub async fn factors_handler(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.read().await;
    (
        StatusCode::OK,
        Json(FactorsResponse::from_table(engine.factors())),
    )
}
