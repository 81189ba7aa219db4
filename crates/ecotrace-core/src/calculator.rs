//! # Emission Calculator
//!
//! The single place where an amount and a factor become a carbon-equivalent
//! quantity. Pure, deterministic, idempotent: the same table, category,
//! subcategory, and amount always yield the same `CentiKg`.
//!
//! Arithmetic: amount (milli-units) x factor (grams/unit) = milligrams CO2e,
//! then half-up rounding into centi-kg. 100 km of car_gasoline (240 g/km)
//! yields exactly 2400 centi-kg = 24.00 kg.

use crate::factors::FactorTable;
use crate::primitives::{MAX_AMOUNT_MILLI, MG_PER_CENTIKG};
use crate::types::{Amount, Category, CentiKg, EcotraceError};

/// Compute the carbon-equivalent for a measurement.
///
/// Rejects out-of-range amounts; unknown subcategories resolve through the
/// table's fallback, never an error. Metadata plays no role here.
pub fn compute(
    table: &FactorTable,
    category: Category,
    subcategory: &str,
    amount: Amount,
) -> Result<CentiKg, EcotraceError> {
    if !amount.in_range() {
        return Err(EcotraceError::validation(
            "amount",
            format!("must be between 0 and {MAX_AMOUNT_MILLI} milli-units"),
        ));
    }
    let factor = table.factor_for(category, subcategory);
    // Max product is 1e12 * 1e6 = 1e18, inside i64.
    let milligrams = amount.value() * factor.value();
    Ok(CentiKg::new(round_half_up(milligrams, MG_PER_CENTIKG)))
}

/// Half-up rounding division for non-negative numerators.
pub(crate) const fn round_half_up(numerator: i64, divisor: i64) -> i64 {
    (numerator + divisor / 2) / divisor
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::factors::FactorTable;

    fn table() -> FactorTable {
        FactorTable::builtin()
    }

    #[test]
    fn gasoline_commute_example() {
        // 100 km at 240 g/km = 24.00 kg CO2e.
        let carbon = compute(
            &table(),
            Category::Transportation,
            "car_gasoline",
            Amount::new(100_000),
        )
        .unwrap();
        assert_eq!(carbon, CentiKg::new(2400));
        assert_eq!(carbon.to_string(), "24.00");
    }

    #[test]
    fn zero_amount_yields_zero() {
        let carbon = compute(&table(), Category::Food, "beef", Amount::new(0)).unwrap();
        assert_eq!(carbon, CentiKg::ZERO);
    }

    #[test]
    fn unknown_subcategory_uses_fallback_factor() {
        // 10 units at the food fallback (2000 g/unit) = 20.00 kg.
        let carbon = compute(&table(), Category::Food, "ambrosia", Amount::new(10_000)).unwrap();
        assert_eq!(carbon, CentiKg::new(2000));
    }

    #[test]
    fn rounding_is_half_up() {
        // 0.5 km by bus: 500 milli * 89 g = 44_500 mg = 4.45 centi-kg,
        // fraction below one half, rounds down to 4.
        let carbon = compute(&table(), Category::Transportation, "bus", Amount::new(500)).unwrap();
        assert_eq!(carbon, CentiKg::new(4));

        // 0.618 km by train: 618 * 41 = 25_338 mg = 2.5338 -> 3 centi-kg.
        let carbon = compute(&table(), Category::Transportation, "train", Amount::new(618)).unwrap();
        assert_eq!(carbon, CentiKg::new(3));
    }

    #[test]
    fn compute_is_idempotent() {
        let a = compute(&table(), Category::Electricity, "coal", Amount::new(123_456)).unwrap();
        let b = compute(&table(), Category::Electricity, "coal", Amount::new(123_456)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn negative_amount_is_rejected() {
        let err = compute(&table(), Category::Waste, "landfill", Amount::new(-1)).unwrap_err();
        assert!(matches!(err, EcotraceError::Validation { field: "amount", .. }));
    }

    #[test]
    fn amount_above_cap_is_rejected() {
        let err = compute(
            &table(),
            Category::Waste,
            "landfill",
            Amount::new(MAX_AMOUNT_MILLI + 1),
        )
        .unwrap_err();
        assert!(matches!(err, EcotraceError::Validation { field: "amount", .. }));
    }
}
