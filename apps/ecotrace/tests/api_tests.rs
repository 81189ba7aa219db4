//! Integration tests for the Ecotrace HTTP API.
//!
//! Uses axum-test to drive the router in-process without starting a real
//! server. Credentials are injected directly as a `TokenMap`, so no test
//! touches process environment variables.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic, clippy::float_arithmetic)]

use axum::http::HeaderValue;
use axum_test::TestServer;
use ecotrace::api::{
    AppState, EmissionResponse, FactorsResponse, HealthResponse, ListResponse, StatsResponse,
    TokenMap, create_router,
};
use ecotrace_core::{Engine, FactorTable, UserId};
use serde_json::json;

const ALICE_TOKEN: &str = "alice-secret";
const BOB_TOKEN: &str = "bob-secret";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Two-user token map used by most tests.
fn test_tokens() -> TokenMap {
    TokenMap::new([
        (ALICE_TOKEN.to_string(), UserId(1)),
        (BOB_TOKEN.to_string(), UserId(2)),
    ])
}

/// Create a test server with a fresh in-memory engine and two users.
fn create_test_server() -> TestServer {
    let engine = Engine::in_memory(FactorTable::builtin());
    let state = AppState::with_tokens(engine, test_tokens());
    TestServer::new(create_router(state)).unwrap()
}

/// Create a test server with no credentials configured (fail closed).
fn create_lockdown_server() -> TestServer {
    let engine = Engine::in_memory(FactorTable::builtin());
    let state = AppState::with_tokens(engine, TokenMap::default());
    TestServer::new(create_router(state)).unwrap()
}

fn bearer(token: &str) -> HeaderValue {
    format!("Bearer {}", token).parse::<HeaderValue>().unwrap()
}

/// Record 100 km of gasoline driving as the given user; returns the record id.
async fn create_commute(server: &TestServer, token: &str) -> u64 {
    let response = server
        .post("/emissions")
        .add_header(axum::http::header::AUTHORIZATION, bearer(token))
        .json(&json!({
            "category": "transportation",
            "subcategory": "car_gasoline",
            "amount": 100.0,
            "unit": "km",
            "timestamp": 1_000,
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: EmissionResponse = response.json();
    body.record.unwrap().id
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn health_needs_no_credentials() {
    let server = create_lockdown_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// AUTHENTICATION TESTS
// =============================================================================

#[tokio::test]
async fn missing_authorization_is_unauthorized() {
    let server = create_test_server();
    let response = server.get("/emissions").await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn invalid_token_is_unauthorized() {
    let server = create_test_server();
    let response = server
        .get("/emissions")
        .add_header(axum::http::header::AUTHORIZATION, bearer("wrong-token"))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn no_configured_tokens_fails_closed() {
    let server = create_lockdown_server();
    let response = server
        .get("/emissions")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn raw_token_without_bearer_prefix_is_accepted() {
    let server = create_test_server();
    let response = server
        .get("/emissions")
        .add_header(
            axum::http::header::AUTHORIZATION,
            ALICE_TOKEN.parse::<HeaderValue>().unwrap(),
        )
        .await;
    response.assert_status_ok();
}

// =============================================================================
// CREATE TESTS
// =============================================================================

#[tokio::test]
async fn create_derives_two_decimal_carbon() {
    let server = create_test_server();

    let response = server
        .post("/emissions")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .json(&json!({
            "category": "transportation",
            "subcategory": "car_gasoline",
            "amount": 100.0,
            "unit": "km",
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: EmissionResponse = response.json();
    assert!(body.success);
    let record = body.record.unwrap();
    // 100 km at 0.24 kg/km is exactly 24.00 kg.
    assert_eq!(record.carbon_kg, 24.0);
    assert_eq!(record.category, "transportation");
    assert_eq!(body.ledger_total_kg, Some(24.0));
}

#[tokio::test]
async fn create_with_unknown_subcategory_uses_fallback() {
    let server = create_test_server();

    let response = server
        .post("/emissions")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .json(&json!({
            "category": "food",
            "subcategory": "ambrosia",
            "amount": 10.0,
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: EmissionResponse = response.json();
    // Food fallback is 2.0 kg/unit.
    assert_eq!(body.record.unwrap().carbon_kg, 20.0);
}

#[tokio::test]
async fn create_rejects_unknown_category() {
    let server = create_test_server();

    let response = server
        .post("/emissions")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .json(&json!({
            "category": "aviation",
            "subcategory": "jet",
            "amount": 1.0,
        }))
        .await;

    response.assert_status_bad_request();
    let body: EmissionResponse = response.json();
    assert!(!body.success);
    assert!(body.error.unwrap().contains("category"));
}

#[tokio::test]
async fn create_rejects_negative_amount() {
    let server = create_test_server();

    let response = server
        .post("/emissions")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .json(&json!({
            "category": "waste",
            "subcategory": "landfill",
            "amount": -5.0,
        }))
        .await;

    response.assert_status_bad_request();
}

// =============================================================================
// GET / OWNERSHIP TESTS
// =============================================================================

#[tokio::test]
async fn owner_can_fetch_their_record() {
    let server = create_test_server();
    let id = create_commute(&server, ALICE_TOKEN).await;

    let response = server
        .get(&format!("/emissions/{}", id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .await;

    response.assert_status_ok();
    let body: EmissionResponse = response.json();
    assert_eq!(body.record.unwrap().id, id);
}

#[tokio::test]
async fn foreign_record_is_indistinguishable_from_missing() {
    let server = create_test_server();
    let id = create_commute(&server, ALICE_TOKEN).await;

    let foreign = server
        .get(&format!("/emissions/{}", id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(BOB_TOKEN))
        .await;
    let missing = server
        .get("/emissions/999999")
        .add_header(axum::http::header::AUTHORIZATION, bearer(BOB_TOKEN))
        .await;

    foreign.assert_status_not_found();
    missing.assert_status_not_found();
    // Identical bodies: existence must not leak across users.
    let foreign_body: EmissionResponse = foreign.json();
    let missing_body: EmissionResponse = missing.json();
    assert_eq!(foreign_body.error, missing_body.error);
}

// =============================================================================
// UPDATE / DELETE TESTS
// =============================================================================

#[tokio::test]
async fn update_recomputes_carbon_and_ledger() {
    let server = create_test_server();
    let id = create_commute(&server, ALICE_TOKEN).await;

    let response = server
        .put(&format!("/emissions/{}", id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .json(&json!({ "amount": 50.0 }))
        .await;

    response.assert_status_ok();
    let body: EmissionResponse = response.json();
    assert_eq!(body.record.unwrap().carbon_kg, 12.0);
    assert_eq!(body.ledger_total_kg, Some(12.0));
}

#[tokio::test]
async fn update_by_non_owner_is_not_found() {
    let server = create_test_server();
    let id = create_commute(&server, ALICE_TOKEN).await;

    let response = server
        .put(&format!("/emissions/{}", id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(BOB_TOKEN))
        .json(&json!({ "amount": 1.0 }))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn delete_zeroes_ledger_and_second_delete_is_not_found() {
    let server = create_test_server();
    let id = create_commute(&server, ALICE_TOKEN).await;

    let first = server
        .delete(&format!("/emissions/{}", id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .await;
    first.assert_status_ok();
    let body: EmissionResponse = first.json();
    assert_eq!(body.ledger_total_kg, Some(0.0));

    let second = server
        .delete(&format!("/emissions/{}", id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .await;
    second.assert_status_not_found();
}

// =============================================================================
// LIST TESTS
// =============================================================================

#[tokio::test]
async fn list_is_scoped_paginated_and_newest_first() {
    let server = create_test_server();
    for ts in [100, 200, 300] {
        server
            .post("/emissions")
            .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
            .json(&json!({
                "category": "transportation",
                "subcategory": "bus",
                "amount": 10.0,
                "timestamp": ts,
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }
    create_commute(&server, BOB_TOKEN).await;

    let response = server
        .get("/emissions?page=1&limit=2")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .await;

    response.assert_status_ok();
    let body: ListResponse = response.json();
    assert_eq!(body.total_count, 3);
    assert_eq!(body.total_pages, 2);
    assert_eq!(body.records.len(), 2);
    assert_eq!(body.records[0].timestamp, 300);
    assert_eq!(body.records[1].timestamp, 200);
}

#[tokio::test]
async fn list_filters_by_category_and_window() {
    let server = create_test_server();
    create_commute(&server, ALICE_TOKEN).await; // transportation, ts 1000
    server
        .post("/emissions")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .json(&json!({
            "category": "food",
            "subcategory": "rice",
            "amount": 1.0,
            "timestamp": 2_000,
        }))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let response = server
        .get("/emissions?category=food&start=1500&end=2500")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .await;

    response.assert_status_ok();
    let body: ListResponse = response.json();
    assert_eq!(body.total_count, 1);
    assert_eq!(body.records[0].category, "food");
}

#[tokio::test]
async fn list_rejects_unknown_category_filter() {
    let server = create_test_server();
    let response = server
        .get("/emissions?category=aviation")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .await;
    response.assert_status_bad_request();
}

// =============================================================================
// STATS TESTS
// =============================================================================

#[tokio::test]
async fn stats_on_empty_store_is_all_zeros() {
    let server = create_test_server();

    let response = server
        .get("/emissions/stats")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .await;

    response.assert_status_ok();
    let body: StatsResponse = response.json();
    assert!(body.success);
    assert_eq!(body.total_emissions_kg, 0.0);
    assert_eq!(body.total_entries, 0);
    assert_eq!(body.average_emission_kg, 0.0);
    assert_eq!(body.highest_emission_kg, 0.0);
    assert!(body.breakdown.is_empty());
}

#[tokio::test]
async fn stats_breaks_down_by_category_sorted_descending() {
    let server = create_test_server();
    create_commute(&server, ALICE_TOKEN).await; // 24 kg transportation
    server
        .post("/emissions")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .json(&json!({
            "category": "food",
            "subcategory": "beef",
            "amount": 2.0,
            "timestamp": 1_000,
        }))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let response = server
        .get("/emissions/stats?start=0&end=2000")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .await;

    response.assert_status_ok();
    let body: StatsResponse = response.json();
    assert_eq!(body.total_entries, 2);
    // Beef: 2 kg at 27 kg/kg = 54 kg; transportation 24 kg; total 78 kg.
    assert_eq!(body.total_emissions_kg, 78.0);
    assert_eq!(body.highest_emission_kg, 54.0);
    assert_eq!(body.breakdown[0].category, "food");
    assert_eq!(body.breakdown[1].category, "transportation");
}

#[tokio::test]
async fn stats_rejects_unknown_named_range() {
    let server = create_test_server();
    let response = server
        .get("/emissions/stats?range=decade")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .await;
    response.assert_status_bad_request();
}

// =============================================================================
// FACTORS TESTS
// =============================================================================

#[tokio::test]
async fn factors_dump_includes_builtin_table() {
    let server = create_test_server();

    let response = server
        .get("/factors")
        .add_header(axum::http::header::AUTHORIZATION, bearer(ALICE_TOKEN))
        .await;

    response.assert_status_ok();
    let body: FactorsResponse = response.json();
    assert_eq!(body.factors.len(), 28);
    assert_eq!(body.fallbacks.len(), 4);
    let gasoline = body
        .factors
        .iter()
        .find(|f| f.subcategory == "car_gasoline")
        .unwrap();
    assert_eq!(gasoline.kg_per_unit, 0.24);
}
