//! # Statistics Engine
//!
//! Read-only summaries over a user's records: overall totals plus a
//! per-category breakdown, computed fresh from the record store on every
//! call. Nothing here caches, so statistics can serve as a cross-check on
//! the ledger (the All window must match the cached total at quiescence).
//!
//! The core never consults the clock; callers resolve "now" and pass it in.

use crate::calculator::round_half_up;
use crate::primitives::SECONDS_PER_WEEK;
use crate::store::{EmissionStore, RecordFilter};
use crate::types::{Category, CentiKg, EcotraceError, UserId};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::collections::BTreeMap;

// =============================================================================
// TIME RANGES
// =============================================================================

/// A statistics window. Calendar ranges are resolved against an explicit
/// `now`; `Between` is an inclusive epoch-second interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    /// No lower or upper bound.
    All,
    /// The rolling 7 days ending at `now`.
    Week,
    /// From the first of the current calendar month (UTC).
    Month,
    /// From January 1st of the current year (UTC).
    Year,
    /// Explicit inclusive interval.
    Between { start: i64, end: i64 },
}

impl TimeRange {
    /// Parse a named range from its wire form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    /// Resolve to inclusive epoch-second bounds.
    #[must_use]
    pub fn resolve(&self, now: DateTime<Utc>) -> (Option<i64>, Option<i64>) {
        match *self {
            Self::All => (None, None),
            Self::Week => (Some(now.timestamp() - SECONDS_PER_WEEK), None),
            Self::Month => {
                let start = Utc
                    .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                    .single()
                    .map_or_else(|| now.timestamp(), |dt| dt.timestamp());
                (Some(start), None)
            }
            Self::Year => {
                let start = Utc
                    .with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
                    .single()
                    .map_or_else(|| now.timestamp(), |dt| dt.timestamp());
                (Some(start), None)
            }
            Self::Between { start, end } => (Some(start), Some(end)),
        }
    }
}

// =============================================================================
// SUMMARIES
// =============================================================================

/// Per-category slice of a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryBreakdown {
    pub category: Category,
    pub total: CentiKg,
    pub count: usize,
    pub average: CentiKg,
}

/// Summary of a user's emissions inside a window.
///
/// Integer sums throughout, so the breakdown totals add up to the overall
/// total exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSummary {
    pub total_emissions: CentiKg,
    pub total_entries: usize,
    pub average_emission: CentiKg,
    pub highest_emission: CentiKg,
    /// Sorted by total descending (category order as the tiebreak).
    pub breakdown: Vec<CategoryBreakdown>,
}

impl StatsSummary {
    /// The all-zeros summary for an empty window.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            total_emissions: CentiKg::ZERO,
            total_entries: 0,
            average_emission: CentiKg::ZERO,
            highest_emission: CentiKg::ZERO,
            breakdown: Vec::new(),
        }
    }
}

/// Compute a user's statistics for a window.
///
/// An empty window yields the all-zeros summary, never an error.
pub fn compute_stats(
    store: &dyn EmissionStore,
    user: UserId,
    range: &TimeRange,
    now: DateTime<Utc>,
) -> Result<StatsSummary, EcotraceError> {
    let (start, end) = range.resolve(now);
    let records = store.find(user, &RecordFilter::between(start, end))?;
    if records.is_empty() {
        return Ok(StatsSummary::empty());
    }

    let mut total = CentiKg::ZERO;
    let mut highest = CentiKg::ZERO;
    let mut per_category: BTreeMap<Category, (CentiKg, usize)> = BTreeMap::new();

    for record in &records {
        let carbon = record.carbon_equivalent;
        total = total.saturating_add(carbon.value());
        if carbon > highest {
            highest = carbon;
        }
        let slot = per_category
            .entry(record.category)
            .or_insert((CentiKg::ZERO, 0));
        slot.0 = slot.0.saturating_add(carbon.value());
        slot.1 += 1;
    }

    let mut breakdown: Vec<CategoryBreakdown> = per_category
        .into_iter()
        .map(|(category, (cat_total, count))| CategoryBreakdown {
            category,
            total: cat_total,
            count,
            average: mean(cat_total, count),
        })
        .collect();
    breakdown.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.category.cmp(&b.category)));

    Ok(StatsSummary {
        total_emissions: total,
        total_entries: records.len(),
        average_emission: mean(total, records.len()),
        highest_emission: highest,
        breakdown,
    })
}

/// Half-up integer mean in centi-kg; zero for an empty set.
fn mean(total: CentiKg, count: usize) -> CentiKg {
    if count == 0 {
        return CentiKg::ZERO;
    }
    CentiKg::new(round_half_up(total.value(), count as i64))
}

// =============================================================================
// TESTS
// =============================================================================
