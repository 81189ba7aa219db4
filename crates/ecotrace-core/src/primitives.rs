//! # Accounting Primitives
//!
//! Scaling constants and validation bounds for the emission accounting path.
//! All quantities are fixed-point integers; the constants here pin down the
//! scales and the accepted input ranges.

// =============================================================================
// FIXED-POINT SCALES
// =============================================================================

/// Milligrams per centi-kg. An `Amount` (milli-units) multiplied by a factor
/// (grams/unit) yields milligrams CO2e; dividing by this constant with
/// half-up rounding yields `CentiKg`.
pub const MG_PER_CENTIKG: i64 = 10_000;

// =============================================================================
// INPUT BOUNDS
// =============================================================================

/// Maximum accepted amount, in milli-units (one billion whole units).
/// Bounds the product `amount * factor` well inside i64.
pub const MAX_AMOUNT_MILLI: i64 = 1_000_000_000_000;

/// Maximum accepted emission factor, in grams CO2e per unit (1000 kg/unit).
pub const MAX_FACTOR_GRAMS: i64 = 1_000_000;

/// Maximum length of a record description, in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 200;

/// Maximum length of a subcategory key, in characters.
pub const MAX_SUBCATEGORY_LENGTH: usize = 64;

/// Maximum length of a unit label, in characters.
pub const MAX_UNIT_LENGTH: usize = 32;

/// Maximum number of metadata entries per record.
pub const MAX_METADATA_ENTRIES: usize = 16;

/// Maximum length of a metadata key, in characters.
pub const MAX_METADATA_KEY_LENGTH: usize = 64;

/// Maximum length of a metadata value, in characters.
pub const MAX_METADATA_VALUE_LENGTH: usize = 256;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for record listings.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Maximum page size for record listings.
pub const MAX_PAGE_LIMIT: usize = 100;

// =============================================================================
// TIME WINDOWS
// =============================================================================

/// Length of the rolling week window, in seconds.
pub const SECONDS_PER_WEEK: i64 = 7 * 86_400;
