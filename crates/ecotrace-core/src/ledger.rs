//! # Aggregate Ledger
//!
//! The per-user running total lives next to the records and is maintained by
//! the store's single-transaction mutation path. This module is the
//! consistency check on top of it: `verify` detects drift between the cached
//! total and the sum of surviving records, `reconcile` repairs it.
//!
//! With record and ledger committed in one transaction, drift can only come
//! from outside interference (a hand-edited database, a partial restore), so
//! reconciliation is an on-demand operator tool rather than part of any
//! request path.

use crate::store::{EmissionStore, RecordFilter};
use crate::types::{CentiKg, EcotraceError, UserId};

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub user: UserId,
    /// Cached total before the repair.
    pub previous: CentiKg,
    /// Recomputed sum of the user's surviving records, now the cached total.
    pub recomputed: CentiKg,
}

impl Reconciliation {
    /// Signed drift in centi-kg (zero when the ledger was already correct).
    #[must_use]
    pub const fn drift(&self) -> i64 {
        self.recomputed.value() - self.previous.value()
    }
}

/// Sum the carbon of all of a user's surviving records.
pub fn recorded_sum(
    store: &dyn EmissionStore,
    user: UserId,
) -> Result<CentiKg, EcotraceError> {
    let records = store.find(user, &RecordFilter::default())?;
    let mut sum = CentiKg::ZERO;
    for record in &records {
        sum = sum.saturating_add(record.carbon_equivalent.value());
    }
    Ok(sum)
}

/// Check the cached ledger total against the recomputed record sum.
///
/// Returns the (agreeing) total, or `LedgerInconsistency` carrying both
/// values when they diverge.
pub fn verify(store: &dyn EmissionStore, user: UserId) -> Result<CentiKg, EcotraceError> {
    let cached = store.ledger_total(user)?;
    let recomputed = recorded_sum(store, user)?;
    if cached != recomputed {
        return Err(EcotraceError::LedgerInconsistency {
            user,
            cached,
            recomputed,
        });
    }
    Ok(cached)
}

/// Recompute the record sum and overwrite the cached total with it.
pub fn reconcile(
    store: &mut dyn EmissionStore,
    user: UserId,
) -> Result<Reconciliation, EcotraceError> {
    let previous = store.ledger_total(user)?;
    let recomputed = recorded_sum(store, user)?;
    store.set_ledger_total(user, recomputed)?;
    Ok(Reconciliation {
        user,
        previous,
        recomputed,
    })
}

// =============================================================================
// TESTS
// =============================================================================
