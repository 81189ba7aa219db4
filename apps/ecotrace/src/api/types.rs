//! # API Request/Response Types
//!
//! JSON structures for the HTTP API, and the conversions between wire-format
//! floats and the core's fixed-point quantities. This module is the only
//! place where carbon values exist as `f64`, and even here the arithmetic
//! happens inside the core's boundary helpers.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use ecotrace_core::{
    Amount, Category, CentiKg, EcotraceError, EmissionEvent, EmissionPatch, EmissionRecord,
    FactorTable, NewEmission, RecordPage, StatsSummary, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// EMISSION RECORD (WIRE FORM)
// =============================================================================

/// An emission record as serialized on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionJson {
    pub id: u64,
    pub category: String,
    pub subcategory: String,
    pub amount: f64,
    pub unit: String,
    /// Derived carbon-equivalent in kg CO2e, always two-decimal exact.
    pub carbon_kg: f64,
    pub timestamp: i64,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl EmissionJson {
    /// Convert a stored record for the wire. The owner is deliberately not
    /// serialized; records only ever travel to their owner.
    #[must_use]
    pub fn from_record(record: &EmissionRecord) -> Self {
        Self {
            id: record.id.0,
            category: record.category.as_str().to_string(),
            subcategory: record.subcategory.clone(),
            amount: record.amount.as_units_f64(),
            unit: record.unit.clone(),
            carbon_kg: record.carbon_equivalent.as_kg_f64(),
            timestamp: record.timestamp,
            description: record.description.clone(),
            metadata: record.metadata.clone(),
        }
    }
}

// =============================================================================
// CREATE / UPDATE REQUESTS
// =============================================================================

/// Request body for recording an emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionRequest {
    pub category: String,
    pub subcategory: String,
    /// Measured amount in whole units (km, kWh, kg, ...).
    pub amount: f64,
    pub unit: Option<String>,
    /// Event time as epoch seconds; defaults to request time.
    pub timestamp: Option<i64>,
    pub description: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl EmissionRequest {
    /// Validate and convert into a core request.
    pub fn to_new_emission(
        &self,
        owner: UserId,
        now: DateTime<Utc>,
    ) -> Result<NewEmission, EcotraceError> {
        let category = parse_category(&self.category)?;
        let amount = parse_amount(self.amount)?;
        Ok(NewEmission {
            owner,
            category,
            subcategory: self.subcategory.clone(),
            amount,
            unit: self.unit.clone().unwrap_or_else(|| "unit".to_string()),
            timestamp: self.timestamp.unwrap_or_else(|| now.timestamp()),
            description: self.description.clone(),
            metadata: self.metadata.clone().unwrap_or_default(),
        })
    }
}

/// Request body for a partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmissionUpdateRequest {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub amount: Option<f64>,
    pub unit: Option<String>,
    pub timestamp: Option<i64>,
    pub description: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl EmissionUpdateRequest {
    /// Validate and convert into a core patch.
    pub fn to_patch(&self) -> Result<EmissionPatch, EcotraceError> {
        let category = match self.category.as_deref() {
            Some(raw) => Some(parse_category(raw)?),
            None => None,
        };
        let amount = match self.amount {
            Some(raw) => Some(parse_amount(raw)?),
            None => None,
        };
        Ok(EmissionPatch {
            category,
            subcategory: self.subcategory.clone(),
            amount,
            unit: self.unit.clone(),
            timestamp: self.timestamp,
            description: self.description.clone(),
            metadata: self.metadata.clone(),
        })
    }
}

fn parse_category(raw: &str) -> Result<Category, EcotraceError> {
    Category::parse(raw).ok_or_else(|| {
        EcotraceError::validation(
            "category",
            format!("unknown category '{raw}' (expected transportation, electricity, food, or waste)"),
        )
    })
}

fn parse_amount(raw: f64) -> Result<Amount, EcotraceError> {
    Amount::from_units_f64(raw)
        .ok_or_else(|| EcotraceError::validation("amount", "must be a finite, non-negative number"))
}

// =============================================================================
// QUERY PARAMETERS
// =============================================================================

/// Query parameters for `GET /emissions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// Query parameters for `GET /emissions/stats`.
/// Explicit `start`/`end` take precedence over a named `range`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsQuery {
    pub range: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// Query parameters for the WebSocket handshake.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

// =============================================================================
// MUTATION RESPONSE
// =============================================================================

/// Response for create/get/update/delete on a single record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionResponse {
    pub success: bool,
    pub record: Option<EmissionJson>,
    /// Owner's ledger total after the operation (mutations only).
    pub ledger_total_kg: Option<f64>,
    pub error: Option<String>,
}

impl EmissionResponse {
    /// A successful read (no ledger movement to report).
    #[must_use]
    pub fn found(record: &EmissionRecord) -> Self {
        Self {
            success: true,
            record: Some(EmissionJson::from_record(record)),
            ledger_total_kg: None,
            error: None,
        }
    }

    /// A successful mutation with the post-commit ledger total.
    #[must_use]
    pub fn committed(record: &EmissionRecord, event: &EmissionEvent) -> Self {
        Self {
            success: true,
            record: Some(EmissionJson::from_record(record)),
            ledger_total_kg: Some(event.ledger_total().as_kg_f64()),
            error: None,
        }
    }

    /// A failed operation.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            record: None,
            ledger_total_kg: None,
            error: Some(message.into()),
        }
    }
}

// =============================================================================
// LIST RESPONSE
// =============================================================================

/// Response for `GET /emissions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub success: bool,
    pub records: Vec<EmissionJson>,
    pub total_count: usize,
    pub total_pages: usize,
    pub page: usize,
    pub error: Option<String>,
}

impl ListResponse {
    #[must_use]
    pub fn ok(page: &RecordPage) -> Self {
        Self {
            success: true,
            records: page.records.iter().map(EmissionJson::from_record).collect(),
            total_count: page.total_count,
            total_pages: page.total_pages,
            page: page.page,
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            records: Vec::new(),
            total_count: 0,
            total_pages: 0,
            page: 0,
            error: Some(message.into()),
        }
    }
}

// =============================================================================
// STATS RESPONSE
// =============================================================================

/// One category slice of a statistics response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownJson {
    pub category: String,
    pub total_kg: f64,
    pub count: usize,
    pub average_kg: f64,
}

/// Response for `GET /emissions/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub success: bool,
    pub total_emissions_kg: f64,
    pub total_entries: usize,
    pub average_emission_kg: f64,
    pub highest_emission_kg: f64,
    pub breakdown: Vec<BreakdownJson>,
    pub error: Option<String>,
}

impl StatsResponse {
    #[must_use]
    pub fn ok(summary: &StatsSummary) -> Self {
        Self {
            success: true,
            total_emissions_kg: summary.total_emissions.as_kg_f64(),
            total_entries: summary.total_entries,
            average_emission_kg: summary.average_emission.as_kg_f64(),
            highest_emission_kg: summary.highest_emission.as_kg_f64(),
            breakdown: summary
                .breakdown
                .iter()
                .map(|slice| BreakdownJson {
                    category: slice.category.as_str().to_string(),
                    total_kg: slice.total.as_kg_f64(),
                    count: slice.count,
                    average_kg: slice.average.as_kg_f64(),
                })
                .collect(),
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            total_emissions_kg: 0.0,
            total_entries: 0,
            average_emission_kg: 0.0,
            highest_emission_kg: 0.0,
            breakdown: Vec::new(),
            error: Some(message.into()),
        }
    }
}

// =============================================================================
// FACTORS RESPONSE
// =============================================================================

/// One entry of the factor table dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorJson {
    pub category: String,
    pub subcategory: String,
    pub kg_per_unit: f64,
}

/// One per-category fallback of the factor table dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackJson {
    pub category: String,
    pub kg_per_unit: f64,
}

/// Response for `GET /factors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorsResponse {
    pub factors: Vec<FactorJson>,
    pub fallbacks: Vec<FallbackJson>,
}

impl FactorsResponse {
    #[must_use]
    pub fn from_table(table: &FactorTable) -> Self {
        Self {
            factors: table
                .entries()
                .map(|(category, subcategory, factor)| FactorJson {
                    category: category.as_str().to_string(),
                    subcategory: subcategory.to_string(),
                    kg_per_unit: factor.as_kg_per_unit_f64(),
                })
                .collect(),
            fallbacks: table
                .fallbacks()
                .map(|(category, factor)| FallbackJson {
                    category: category.as_str().to_string(),
                    kg_per_unit: factor.as_kg_per_unit_f64(),
                })
                .collect(),
        }
    }
}

// =============================================================================
// NOTIFICATION FRAMES
// =============================================================================

/// The greeting frame sent right after a successful WebSocket upgrade.
/// Carries the owner's current ledger total so a reconnecting session
/// starts synchronized without an extra fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreetingFrame {
    pub event: String,
    pub user_id: u64,
    pub ledger_total_kg: f64,
}

impl GreetingFrame {
    #[must_use]
    pub fn for_user(user: UserId, ledger_total: CentiKg) -> Self {
        Self {
            event: "connected".to_string(),
            user_id: user.0,
            ledger_total_kg: ledger_total.as_kg_f64(),
        }
    }
}

/// One change notification frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    /// `record_created`, `record_updated`, or `record_deleted`.
    pub event: String,
    pub record: EmissionJson,
    pub ledger_total_kg: f64,
}

impl EventFrame {
    #[must_use]
    pub fn from_event(event: &EmissionEvent) -> Self {
        let record = match event {
            EmissionEvent::Created { record, .. }
            | EmissionEvent::Updated { record, .. }
            | EmissionEvent::Deleted { record, .. } => record,
        };
        Self {
            event: event.kind().to_string(),
            record: EmissionJson::from_record(record),
            ledger_total_kg: event.ledger_total().as_kg_f64(),
        }
    }
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// Map a core error onto its HTTP status.
#[must_use]
pub fn status_for(error: &EcotraceError) -> StatusCode {
    match error {
        EcotraceError::Validation { .. } => StatusCode::BAD_REQUEST,
        EcotraceError::NotFound => StatusCode::NOT_FOUND,
        EcotraceError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
        EcotraceError::Storage(_) | EcotraceError::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
        EcotraceError::LedgerInconsistency { .. } | EcotraceError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
