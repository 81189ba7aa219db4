//! # Emission Factor Table
//!
//! Maps `(Category, subcategory)` to an emission factor in grams CO2e per
//! unit. The built-in table is compiled in; deployments may override or
//! extend it from a configuration file at startup, after which the table is
//! read-only.
//!
//! Unknown subcategories never fail a request: they degrade to the
//! per-category fallback factor, so a client with a novel vehicle type still
//! gets a defensible estimate.

use crate::primitives::MAX_FACTOR_GRAMS;
use crate::types::{Category, EcotraceError, FactorGrams};
use std::collections::BTreeMap;

// =============================================================================
// BUILT-IN TABLE (grams CO2e per unit)
// =============================================================================

const TRANSPORTATION_FACTORS: &[(&str, i64)] = &[
    ("car_gasoline", 240),
    ("car_diesel", 270),
    ("car_electric", 50),
    ("motorcycle", 140),
    ("bus", 89),
    ("train", 41),
    ("flight_short", 255),
    ("flight_medium", 156),
    ("flight_long", 150),
];

const ELECTRICITY_FACTORS: &[(&str, i64)] = &[
    ("grid_average", 475),
    ("renewable", 50),
    ("coal", 950),
    ("natural_gas", 450),
];

const FOOD_FACTORS: &[(&str, i64)] = &[
    ("beef", 27_000),
    ("lamb", 39_200),
    ("pork", 12_100),
    ("chicken", 6_900),
    ("fish", 6_100),
    ("eggs", 4_800),
    ("cheese", 13_500),
    ("milk", 3_200),
    ("rice", 2_700),
    ("vegetables", 2_000),
    ("fruits", 1_100),
];

const WASTE_FACTORS: &[(&str, i64)] = &[
    ("landfill", 500),
    ("recycling", 100),
    ("composting", 50),
    ("incineration", 400),
];

/// Per-category fallback factors for unknown subcategories.
/// Electricity falls back to the grid average; waste to landfill.
const FALLBACK_FACTORS: &[(Category, i64)] = &[
    (Category::Transportation, 200),
    (Category::Electricity, 475),
    (Category::Food, 2_000),
    (Category::Waste, 500),
];

// =============================================================================
// FACTOR TABLE
// =============================================================================

/// The resolved emission factor table.
///
/// Deterministic iteration order (BTreeMap) so that `/factors` dumps and
/// test snapshots are stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorTable {
    factors: BTreeMap<(Category, String), FactorGrams>,
    fallbacks: BTreeMap<Category, FactorGrams>,
}

impl FactorTable {
    /// The built-in table.
    #[must_use]
    pub fn builtin() -> Self {
        let mut factors = BTreeMap::new();
        let groups: [(Category, &[(&str, i64)]); 4] = [
            (Category::Transportation, TRANSPORTATION_FACTORS),
            (Category::Electricity, ELECTRICITY_FACTORS),
            (Category::Food, FOOD_FACTORS),
            (Category::Waste, WASTE_FACTORS),
        ];
        for (category, entries) in groups {
            for &(subcategory, grams) in entries {
                factors.insert((category, subcategory.to_string()), FactorGrams::new(grams));
            }
        }
        let fallbacks = FALLBACK_FACTORS
            .iter()
            .map(|&(category, grams)| (category, FactorGrams::new(grams)))
            .collect();
        Self { factors, fallbacks }
    }

    /// Resolve the factor for a category/subcategory pair.
    ///
    /// Unknown subcategories return the category fallback.
    #[must_use]
    pub fn factor_for(&self, category: Category, subcategory: &str) -> FactorGrams {
        self.factors
            .get(&(category, subcategory.to_string()))
            .copied()
            .unwrap_or_else(|| self.fallback_for(category))
    }

    /// The fallback factor for a category.
    #[must_use]
    pub fn fallback_for(&self, category: Category) -> FactorGrams {
        self.fallbacks.get(&category).copied().unwrap_or_default()
    }

    /// Insert or replace a factor entry. Rejects out-of-range factors.
    pub fn set_factor(
        &mut self,
        category: Category,
        subcategory: impl Into<String>,
        factor: FactorGrams,
    ) -> Result<(), EcotraceError> {
        if !factor.in_range() {
            return Err(EcotraceError::validation(
                "factor",
                format!("must be between 0 and {MAX_FACTOR_GRAMS} grams per unit"),
            ));
        }
        self.factors.insert((category, subcategory.into()), factor);
        Ok(())
    }

    /// Replace a category fallback. Rejects out-of-range factors.
    pub fn set_fallback(
        &mut self,
        category: Category,
        factor: FactorGrams,
    ) -> Result<(), EcotraceError> {
        if !factor.in_range() {
            return Err(EcotraceError::validation(
                "factor",
                format!("must be between 0 and {MAX_FACTOR_GRAMS} grams per unit"),
            ));
        }
        self.fallbacks.insert(category, factor);
        Ok(())
    }

    /// Iterate all factor entries in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = (Category, &str, FactorGrams)> {
        self.factors
            .iter()
            .map(|((category, subcategory), factor)| (*category, subcategory.as_str(), *factor))
    }

    /// Iterate the per-category fallbacks in canonical order.
    pub fn fallbacks(&self) -> impl Iterator<Item = (Category, FactorGrams)> {
        self.fallbacks.iter().map(|(category, factor)| (*category, *factor))
    }

    /// Number of explicit factor entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Whether the table has no explicit entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

impl Default for FactorTable {
    fn default() -> Self {
        Self::builtin()
    }
}

// =============================================================================
// TESTS
// =============================================================================
