//! # Core Type Definitions
//!
//! This module contains all core types for the Ecotrace emission accounting
//! engine:
//! - Identity types (`UserId`, `RecordId`)
//! - Fixed-point quantities (`CentiKg`, `Amount`, `FactorGrams`)
//! - The emission category enum (`Category`)
//! - Record structures (`EmissionRecord`, `EmissionDraft`)
//! - Error types (`EcotraceError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point in the accounting path)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Use saturating arithmetic for totals to prevent overflow
//!
//! Floating-point values exist only at the JSON/CLI boundary; the conversion
//! helpers on `CentiKg`, `Amount`, and `FactorGrams` are the sole crossing
//! points and carry explicit lint allowances.

use crate::primitives::{MAX_AMOUNT_MILLI, MAX_FACTOR_GRAMS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTITY TYPES
// =============================================================================

/// Unique identifier for a user, supplied by the external identity provider.
/// The core trusts this identity and performs no authentication itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// Unique identifier for an emission record, assigned by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

// =============================================================================
// FIXED-POINT QUANTITIES
// =============================================================================

/// A carbon-equivalent quantity in hundredths of a kg CO2e.
///
/// This is the "rounded to 2 decimal places" policy made exact: every value
/// representable on the wire as `NN.NN` kg maps to exactly one `CentiKg`, so
/// totals and ledger deltas never accumulate float noise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct CentiKg(pub i64);

impl CentiKg {
    /// The zero quantity.
    pub const ZERO: Self = Self(0);

    /// Create a new quantity with the given value in centi-kg.
    #[must_use]
    pub const fn new(centi_kg: i64) -> Self {
        Self(centi_kg)
    }

    /// Get the raw value in centi-kg.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Add a signed delta (in centi-kg) using saturating arithmetic.
    /// This is the ONLY mutation the ledger performs on a running total.
    #[must_use]
    pub const fn saturating_add(self, delta: i64) -> Self {
        Self(self.0.saturating_add(delta))
    }

    /// Convert to kg for the JSON boundary.
    ///
    /// Single crossing point from integer accounting to the wire format.
    #[allow(clippy::float_arithmetic)]
    #[must_use]
    pub fn as_kg_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for CentiKg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// A caller-supplied measurement in thousandths of its unit (milli-units).
///
/// The unit itself (km, kWh, kg, ...) is informational; the calculator only
/// needs the magnitude. Values are non-negative and bounded by
/// `MAX_AMOUNT_MILLI`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Amount(pub i64);

impl Amount {
    /// Create a new amount with the given value in milli-units.
    #[must_use]
    pub const fn new(milli_units: i64) -> Self {
        Self(milli_units)
    }

    /// Get the raw value in milli-units.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Whether the amount is within the accepted range (0..=MAX_AMOUNT_MILLI).
    #[must_use]
    pub const fn in_range(self) -> bool {
        self.0 >= 0 && self.0 <= MAX_AMOUNT_MILLI
    }

    /// Parse a boundary f64 (whole units) into milli-units.
    ///
    /// Returns `None` for NaN, infinities, negatives, and out-of-range values.
    /// Single crossing point from the wire format to integer accounting.
    #[allow(clippy::float_arithmetic)]
    #[must_use]
    pub fn from_units_f64(units: f64) -> Option<Self> {
        if !units.is_finite() || units < 0.0 {
            return None;
        }
        let milli = (units * 1000.0).round();
        if milli > MAX_AMOUNT_MILLI as f64 {
            return None;
        }
        Some(Self(milli as i64))
    }

    /// Convert back to whole units for the JSON boundary.
    #[allow(clippy::float_arithmetic)]
    #[must_use]
    pub fn as_units_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

/// An emission factor in grams CO2e per unit of measurement.
///
/// Every factor in the built-in table is exact in grams (e.g. a city bus at
/// 0.089 kg/km is 89 g/km), so the table never holds a rounded value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct FactorGrams(pub i64);

impl FactorGrams {
    /// Create a new factor with the given value in grams per unit.
    #[must_use]
    pub const fn new(grams: i64) -> Self {
        Self(grams)
    }

    /// Get the raw value in grams per unit.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Whether the factor is within the accepted range (0..=MAX_FACTOR_GRAMS).
    #[must_use]
    pub const fn in_range(self) -> bool {
        self.0 >= 0 && self.0 <= MAX_FACTOR_GRAMS
    }

    /// Parse a boundary f64 (kg CO2e per unit) into grams per unit.
    ///
    /// Used when loading factor overrides from configuration files.
    #[allow(clippy::float_arithmetic)]
    #[must_use]
    pub fn from_kg_per_unit_f64(kg: f64) -> Option<Self> {
        if !kg.is_finite() || kg < 0.0 {
            return None;
        }
        let grams = (kg * 1000.0).round();
        if grams > MAX_FACTOR_GRAMS as f64 {
            return None;
        }
        Some(Self(grams as i64))
    }

    /// Convert to kg per unit for display.
    #[allow(clippy::float_arithmetic)]
    #[must_use]
    pub fn as_kg_per_unit_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

// =============================================================================
// CATEGORY
// =============================================================================

/// The fixed set of emission categories.
///
/// The category is a closed enum: an unrecognized category string is a
/// validation error at the boundary. Unrecognized *subcategories*, by
/// contrast, degrade to the category fallback factor (see `FactorTable`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Transportation,
    Electricity,
    Food,
    Waste,
}

impl Category {
    /// All categories, in canonical order.
    pub const ALL: [Self; 4] = [
        Self::Transportation,
        Self::Electricity,
        Self::Food,
        Self::Waste,
    ];

    /// Parse a category from its wire name. Returns `None` if unrecognized.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transportation" => Some(Self::Transportation),
            "electricity" => Some(Self::Electricity),
            "food" => Some(Self::Food),
            "waste" => Some(Self::Waste),
            _ => None,
        }
    }

    /// The wire name of this category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transportation => "transportation",
            Self::Electricity => "electricity",
            Self::Food => "food",
            Self::Waste => "waste",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// EMISSION RECORD
// =============================================================================

/// A fully validated emission record as stored in the record store.
///
/// `carbon_equivalent` is always derived by the calculator; it is never
/// accepted verbatim from a client, and it is recomputed whenever the
/// category, subcategory, or amount changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionRecord {
    /// Store-assigned record identifier.
    pub id: RecordId,
    /// The user who exclusively owns this record.
    pub owner: UserId,
    /// Emission category.
    pub category: Category,
    /// Subcategory key into the factor table (free-form; unknown keys use
    /// the category fallback factor).
    pub subcategory: String,
    /// Measured amount in milli-units.
    pub amount: Amount,
    /// The caller's unit label (informational only).
    pub unit: String,
    /// Derived carbon-equivalent quantity.
    pub carbon_equivalent: CentiKg,
    /// Event time as epoch seconds (defaults to creation time).
    pub timestamp: i64,
    /// Optional free-text description, bounded length.
    pub description: Option<String>,
    /// Open key/value bag documenting context (vehicle type, fuel type, ...).
    /// Never read by the numeric path.
    pub metadata: BTreeMap<String, String>,
}

impl EmissionRecord {
    /// Assemble a record from a draft and a store-assigned id.
    #[must_use]
    pub fn from_draft(id: RecordId, draft: EmissionDraft) -> Self {
        Self {
            id,
            owner: draft.owner,
            category: draft.category,
            subcategory: draft.subcategory,
            amount: draft.amount,
            unit: draft.unit,
            carbon_equivalent: draft.carbon_equivalent,
            timestamp: draft.timestamp,
            description: draft.description,
            metadata: draft.metadata,
        }
    }
}

/// An emission record awaiting id assignment by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmissionDraft {
    pub owner: UserId,
    pub category: Category,
    pub subcategory: String,
    pub amount: Amount,
    pub unit: String,
    pub carbon_equivalent: CentiKg,
    pub timestamp: i64,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Ecotrace system.
///
/// - No silent failures
/// - Use `Result<T, EcotraceError>` for fallible operations
/// - The CORE should never panic; all errors must be recoverable
#[derive(Debug, Error)]
pub enum EcotraceError {
    /// Client input rejected before any durable state was touched.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// The offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The record does not exist, or exists but belongs to another user.
    /// The two cases are deliberately indistinguishable to the caller.
    #[error("emission record not found")]
    NotFound,

    /// A channel connection presented an invalid or missing credential.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The cached ledger total diverged from the sum of the user's records.
    #[error("ledger drift for user {user:?}: cached {cached}, recomputed {recomputed}")]
    LedgerInconsistency {
        user: UserId,
        cached: CentiKg,
        recomputed: CentiKg,
    },

    /// A transient backing-store failure; retryable by the caller.
    #[error("storage error: {0}")]
    Storage(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl EcotraceError {
    /// Convenience constructor for validation failures.
    #[must_use]
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
