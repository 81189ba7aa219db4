//! # Record Store
//!
//! The storage seam for emission records and per-user ledger totals.
//! `EmissionStore` is object-safe so the engine can dispatch over the
//! in-memory and persistent backends uniformly.
//!
//! Ownership rule: every lookup is scoped by owner, and a record that exists
//! but belongs to another user is indistinguishable from one that does not
//! exist at all. Nothing in this module can leak record existence across
//! users.
//!
//! Ledger rule: each mutation applies its carbon delta to the owner's ledger
//! in the same logical step as the record write. `update` re-reads the old
//! carbon value itself and applies `new - old`; callers never supply the old
//! value.

use crate::types::{
    Amount, Category, CentiKg, EcotraceError, EmissionDraft, EmissionRecord, RecordId, UserId,
};
use std::collections::BTreeMap;

// =============================================================================
// RECORD FILTER
// =============================================================================

/// Filter for record listings: optional category and inclusive timestamp
/// range. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub category: Option<Category>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl RecordFilter {
    /// Restrict to an inclusive epoch-second window.
    #[must_use]
    pub const fn between(start: Option<i64>, end: Option<i64>) -> Self {
        Self {
            category: None,
            start,
            end,
        }
    }

    /// Whether a record passes the filter.
    #[must_use]
    pub fn matches(&self, record: &EmissionRecord) -> bool {
        if let Some(category) = self.category
            && record.category != category
        {
            return false;
        }
        if let Some(start) = self.start
            && record.timestamp < start
        {
            return false;
        }
        if let Some(end) = self.end
            && record.timestamp > end
        {
            return false;
        }
        true
    }
}

/// Newest-first ordering for listings: timestamp descending, id descending
/// as the tiebreak. Total and deterministic.
pub(crate) fn sort_newest_first(records: &mut [EmissionRecord]) {
    records.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    });
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Storage backend for emission records and ledger totals.
pub trait EmissionStore {
    /// Assign an id, persist the record, and apply `+carbon` to the owner's
    /// ledger as one atomic step. Returns the record and the new total.
    fn insert(&mut self, draft: EmissionDraft)
    -> Result<(EmissionRecord, CentiKg), EcotraceError>;

    /// Fetch one record scoped by owner. `None` covers both "does not exist"
    /// and "belongs to someone else".
    fn find_one(&self, id: RecordId, owner: UserId)
    -> Result<Option<EmissionRecord>, EcotraceError>;

    /// Fetch all of an owner's records passing the filter, newest first.
    fn find(
        &self,
        owner: UserId,
        filter: &RecordFilter,
    ) -> Result<Vec<EmissionRecord>, EcotraceError>;

    /// Replace a stored record and apply `new - old` to the ledger as one
    /// atomic step. The old carbon value is re-read under the same step.
    /// `None` if the id is absent or owned by another user.
    fn update(
        &mut self,
        record: EmissionRecord,
    ) -> Result<Option<(EmissionRecord, CentiKg)>, EcotraceError>;

    /// Remove a record and apply `-carbon` to the ledger as one atomic step.
    /// `None` if the id is absent or owned by another user; a second delete
    /// of the same id is `None` and leaves the ledger untouched.
    fn delete(
        &mut self,
        id: RecordId,
        owner: UserId,
    ) -> Result<Option<(EmissionRecord, CentiKg)>, EcotraceError>;

    /// The owner's cached ledger total (zero if never written).
    fn ledger_total(&self, owner: UserId) -> Result<CentiKg, EcotraceError>;

    /// Atomically add a signed delta (centi-kg) to the owner's ledger and
    /// return the new total.
    fn apply_ledger_delta(&mut self, owner: UserId, delta: i64)
    -> Result<CentiKg, EcotraceError>;

    /// Overwrite the owner's ledger total (reconciliation only).
    fn set_ledger_total(&mut self, owner: UserId, total: CentiKg) -> Result<(), EcotraceError>;

    /// Number of records the owner holds.
    fn record_count(&self, owner: UserId) -> Result<usize, EcotraceError>;
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// BTreeMap-backed store for tests and ephemeral runs. Same semantics as the
/// persistent backend, minus durability.
#[derive(Debug, Default)]
pub struct MemStore {
    records: BTreeMap<RecordId, EmissionRecord>,
    ledger: BTreeMap<UserId, CentiKg>,
    next_record_id: u64,
}

impl MemStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> RecordId {
        let id = RecordId(self.next_record_id);
        self.next_record_id += 1;
        id
    }

    fn bump_ledger(&mut self, owner: UserId, delta: i64) -> CentiKg {
        let total = self
            .ledger
            .entry(owner)
            .or_insert(CentiKg::ZERO);
        *total = total.saturating_add(delta);
        *total
    }
}

impl EmissionStore for MemStore {
    fn insert(
        &mut self,
        draft: EmissionDraft,
    ) -> Result<(EmissionRecord, CentiKg), EcotraceError> {
        let id = self.next_id();
        let record = EmissionRecord::from_draft(id, draft);
        let total = self.bump_ledger(record.owner, record.carbon_equivalent.value());
        self.records.insert(id, record.clone());
        Ok((record, total))
    }

    fn find_one(
        &self,
        id: RecordId,
        owner: UserId,
    ) -> Result<Option<EmissionRecord>, EcotraceError> {
        Ok(self
            .records
            .get(&id)
            .filter(|record| record.owner == owner)
            .cloned())
    }

    fn find(
        &self,
        owner: UserId,
        filter: &RecordFilter,
    ) -> Result<Vec<EmissionRecord>, EcotraceError> {
        let mut records: Vec<EmissionRecord> = self
            .records
            .values()
            .filter(|record| record.owner == owner && filter.matches(record))
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn update(
        &mut self,
        record: EmissionRecord,
    ) -> Result<Option<(EmissionRecord, CentiKg)>, EcotraceError> {
        let old_carbon = match self.records.get(&record.id) {
            Some(existing) if existing.owner == record.owner => existing.carbon_equivalent,
            _ => return Ok(None),
        };
        let delta = record.carbon_equivalent.value() - old_carbon.value();
        let total = self.bump_ledger(record.owner, delta);
        self.records.insert(record.id, record.clone());
        Ok(Some((record, total)))
    }

    fn delete(
        &mut self,
        id: RecordId,
        owner: UserId,
    ) -> Result<Option<(EmissionRecord, CentiKg)>, EcotraceError> {
        match self.records.get(&id) {
            Some(existing) if existing.owner == owner => {}
            _ => return Ok(None),
        }
        let record = match self.records.remove(&id) {
            Some(record) => record,
            None => return Ok(None),
        };
        let total = self.bump_ledger(owner, -record.carbon_equivalent.value());
        Ok(Some((record, total)))
    }

    fn ledger_total(&self, owner: UserId) -> Result<CentiKg, EcotraceError> {
        Ok(self.ledger.get(&owner).copied().unwrap_or(CentiKg::ZERO))
    }

    fn apply_ledger_delta(
        &mut self,
        owner: UserId,
        delta: i64,
    ) -> Result<CentiKg, EcotraceError> {
        Ok(self.bump_ledger(owner, delta))
    }

    fn set_ledger_total(&mut self, owner: UserId, total: CentiKg) -> Result<(), EcotraceError> {
        self.ledger.insert(owner, total);
        Ok(())
    }

    fn record_count(&self, owner: UserId) -> Result<usize, EcotraceError> {
        Ok(self
            .records
            .values()
            .filter(|record| record.owner == owner)
            .count())
    }
}

// =============================================================================
// TESTS
// =============================================================================
