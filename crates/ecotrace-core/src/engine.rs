//! # Emission Engine
//!
//! The orchestrator over factor table, calculator, record store, ledger, and
//! statistics. All mutations validate first, so nothing durable is touched
//! when a request is rejected; then they go through the store's
//! single-transaction path and come back with the new ledger total, which
//! lets the caller publish change events in commit order.
//!
//! The engine is synchronous and clock-free. "Now" is always an argument.

use crate::calculator;
use crate::events::EmissionEvent;
use crate::factors::FactorTable;
use crate::ledger::{self, Reconciliation};
use crate::primitives::{
    DEFAULT_PAGE_LIMIT, MAX_DESCRIPTION_LENGTH, MAX_METADATA_ENTRIES, MAX_METADATA_KEY_LENGTH,
    MAX_METADATA_VALUE_LENGTH, MAX_PAGE_LIMIT, MAX_SUBCATEGORY_LENGTH, MAX_UNIT_LENGTH,
};
use crate::stats::{self, StatsSummary, TimeRange};
use crate::storage::RedbStore;
use crate::store::{EmissionStore, MemStore, RecordFilter};
use crate::types::{
    Amount, Category, CentiKg, EcotraceError, EmissionDraft, EmissionRecord, RecordId, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// The storage backend an engine runs on.
#[derive(Debug)]
pub enum StorageBackend {
    /// BTreeMap store for tests and ephemeral runs.
    InMemory(MemStore),
    /// redb store for durable deployments.
    Persistent(RedbStore),
}

impl StorageBackend {
    fn store(&self) -> &dyn EmissionStore {
        match self {
            Self::InMemory(store) => store,
            Self::Persistent(store) => store,
        }
    }

    fn store_mut(&mut self) -> &mut dyn EmissionStore {
        match self {
            Self::InMemory(store) => store,
            Self::Persistent(store) => store,
        }
    }
}

// =============================================================================
// REQUEST SHAPES
// =============================================================================

/// A validated-on-entry request to record an emission.
#[derive(Debug, Clone)]
pub struct NewEmission {
    pub owner: UserId,
    pub category: Category,
    pub subcategory: String,
    pub amount: Amount,
    pub unit: String,
    /// Event time as epoch seconds; callers default this to request time.
    pub timestamp: i64,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// A partial update. `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct EmissionPatch {
    pub category: Option<Category>,
    pub subcategory: Option<String>,
    pub amount: Option<Amount>,
    pub unit: Option<String>,
    pub timestamp: Option<i64>,
    pub description: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl EmissionPatch {
    /// Whether applying this patch can change the derived carbon value.
    #[must_use]
    pub const fn touches_carbon(&self) -> bool {
        self.category.is_some() || self.subcategory.is_some() || self.amount.is_some()
    }
}

/// Listing page request. Out-of-range values are clamped, not rejected.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// 1-based page number.
    pub page: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Pagination {
    fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

/// One page of a record listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPage {
    pub records: Vec<EmissionRecord>,
    pub total_count: usize,
    pub total_pages: usize,
    pub page: usize,
}

// =============================================================================
// ENGINE
// =============================================================================

/// The emission accounting engine.
#[derive(Debug)]
pub struct Engine {
    backend: StorageBackend,
    factors: FactorTable,
}

impl Engine {
    /// In-memory engine with the given factor table.
    #[must_use]
    pub fn in_memory(factors: FactorTable) -> Self {
        Self {
            backend: StorageBackend::InMemory(MemStore::new()),
            factors,
        }
    }

    /// Durable engine over a redb database at the given path.
    pub fn open(path: impl AsRef<Path>, factors: FactorTable) -> Result<Self, EcotraceError> {
        Ok(Self {
            backend: StorageBackend::Persistent(RedbStore::open(path)?),
            factors,
        })
    }

    /// Whether this engine survives a restart.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// The resolved factor table.
    #[must_use]
    pub const fn factors(&self) -> &FactorTable {
        &self.factors
    }

    // -------------------------------------------------------------------------
    // MUTATIONS
    // -------------------------------------------------------------------------

    /// Record a new emission. Returns the stored record (with derived
    /// carbon) and the corresponding change event.
    pub fn create(
        &mut self,
        new: NewEmission,
    ) -> Result<(EmissionRecord, EmissionEvent), EcotraceError> {
        validate_fields(
            &new.subcategory,
            &new.unit,
            new.description.as_deref(),
            &new.metadata,
        )?;
        let carbon =
            calculator::compute(&self.factors, new.category, &new.subcategory, new.amount)?;
        let draft = EmissionDraft {
            owner: new.owner,
            category: new.category,
            subcategory: new.subcategory,
            amount: new.amount,
            unit: new.unit,
            carbon_equivalent: carbon,
            timestamp: new.timestamp,
            description: new.description,
            metadata: new.metadata,
        };
        let (record, ledger_total) = self.backend.store_mut().insert(draft)?;
        let event = EmissionEvent::Created {
            record: record.clone(),
            ledger_total,
        };
        Ok((record, event))
    }

    /// Apply a partial update. The carbon value is recomputed whenever the
    /// category, subcategory, or amount changes, and the ledger moves by
    /// the difference between the new and old carbon values.
    pub fn update(
        &mut self,
        id: RecordId,
        owner: UserId,
        patch: EmissionPatch,
    ) -> Result<(EmissionRecord, EmissionEvent), EcotraceError> {
        let mut record = self
            .backend
            .store()
            .find_one(id, owner)?
            .ok_or(EcotraceError::NotFound)?;

        let recompute = patch.touches_carbon();
        if let Some(category) = patch.category {
            record.category = category;
        }
        if let Some(subcategory) = patch.subcategory {
            record.subcategory = subcategory;
        }
        if let Some(amount) = patch.amount {
            record.amount = amount;
        }
        if let Some(unit) = patch.unit {
            record.unit = unit;
        }
        if let Some(timestamp) = patch.timestamp {
            record.timestamp = timestamp;
        }
        if let Some(description) = patch.description {
            record.description = Some(description);
        }
        if let Some(metadata) = patch.metadata {
            record.metadata = metadata;
        }

        validate_fields(
            &record.subcategory,
            &record.unit,
            record.description.as_deref(),
            &record.metadata,
        )?;
        if recompute {
            record.carbon_equivalent = calculator::compute(
                &self.factors,
                record.category,
                &record.subcategory,
                record.amount,
            )?;
        }

        let (record, ledger_total) = self
            .backend
            .store_mut()
            .update(record)?
            .ok_or(EcotraceError::NotFound)?;
        let event = EmissionEvent::Updated {
            record: record.clone(),
            ledger_total,
        };
        Ok((record, event))
    }

    /// Delete a record, subtracting its carbon from the ledger. Deleting a
    /// missing (or foreign) record is `NotFound` and changes nothing.
    pub fn delete(
        &mut self,
        id: RecordId,
        owner: UserId,
    ) -> Result<(EmissionRecord, EmissionEvent), EcotraceError> {
        let (record, ledger_total) = self
            .backend
            .store_mut()
            .delete(id, owner)?
            .ok_or(EcotraceError::NotFound)?;
        let event = EmissionEvent::Deleted {
            record: record.clone(),
            ledger_total,
        };
        Ok((record, event))
    }

    // -------------------------------------------------------------------------
    // READS
    // -------------------------------------------------------------------------

    /// Fetch one record. Missing and foreign-owned are the same `NotFound`.
    pub fn get(&self, id: RecordId, owner: UserId) -> Result<EmissionRecord, EcotraceError> {
        self.backend
            .store()
            .find_one(id, owner)?
            .ok_or(EcotraceError::NotFound)
    }

    /// List records newest-first with filtering and pagination.
    pub fn list(
        &self,
        owner: UserId,
        filter: &RecordFilter,
        pagination: Pagination,
    ) -> Result<RecordPage, EcotraceError> {
        let pagination = pagination.normalized();
        let records = self.backend.store().find(owner, filter)?;
        let total_count = records.len();
        let total_pages = total_count.div_ceil(pagination.limit);
        let page_records = records
            .into_iter()
            .skip((pagination.page - 1).saturating_mul(pagination.limit))
            .take(pagination.limit)
            .collect();
        Ok(RecordPage {
            records: page_records,
            total_count,
            total_pages,
            page: pagination.page,
        })
    }

    /// Compute statistics for a window.
    pub fn stats(
        &self,
        owner: UserId,
        range: &TimeRange,
        now: DateTime<Utc>,
    ) -> Result<StatsSummary, EcotraceError> {
        stats::compute_stats(self.backend.store(), owner, range, now)
    }

    /// The owner's cached ledger total.
    pub fn ledger_total(&self, owner: UserId) -> Result<CentiKg, EcotraceError> {
        self.backend.store().ledger_total(owner)
    }

    /// Check ledger consistency for one user.
    pub fn verify_ledger(&self, owner: UserId) -> Result<CentiKg, EcotraceError> {
        ledger::verify(self.backend.store(), owner)
    }

    /// Repair ledger drift for one user.
    pub fn reconcile_ledger(&mut self, owner: UserId) -> Result<Reconciliation, EcotraceError> {
        ledger::reconcile(self.backend.store_mut(), owner)
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn validate_fields(
    subcategory: &str,
    unit: &str,
    description: Option<&str>,
    metadata: &BTreeMap<String, String>,
) -> Result<(), EcotraceError> {
    if subcategory.is_empty() {
        return Err(EcotraceError::validation("subcategory", "must not be empty"));
    }
    if subcategory.chars().count() > MAX_SUBCATEGORY_LENGTH {
        return Err(EcotraceError::validation(
            "subcategory",
            format!("must be at most {MAX_SUBCATEGORY_LENGTH} characters"),
        ));
    }
    if unit.is_empty() {
        return Err(EcotraceError::validation("unit", "must not be empty"));
    }
    if unit.chars().count() > MAX_UNIT_LENGTH {
        return Err(EcotraceError::validation(
            "unit",
            format!("must be at most {MAX_UNIT_LENGTH} characters"),
        ));
    }
    if let Some(description) = description
        && description.chars().count() > MAX_DESCRIPTION_LENGTH
    {
        return Err(EcotraceError::validation(
            "description",
            format!("must be at most {MAX_DESCRIPTION_LENGTH} characters"),
        ));
    }
    if metadata.len() > MAX_METADATA_ENTRIES {
        return Err(EcotraceError::validation(
            "metadata",
            format!("must have at most {MAX_METADATA_ENTRIES} entries"),
        ));
    }
    for (key, value) in metadata {
        if key.is_empty() || key.chars().count() > MAX_METADATA_KEY_LENGTH {
            return Err(EcotraceError::validation(
                "metadata",
                format!("keys must be 1..={MAX_METADATA_KEY_LENGTH} characters"),
            ));
        }
        if value.chars().count() > MAX_METADATA_VALUE_LENGTH {
            return Err(EcotraceError::validation(
                "metadata",
                format!("values must be at most {MAX_METADATA_VALUE_LENGTH} characters"),
            ));
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn engine() -> Engine {
        Engine::in_memory(FactorTable::builtin())
    }

    fn new_emission(owner: u64) -> NewEmission {
        NewEmission {
            owner: UserId(owner),
            category: Category::Transportation,
            subcategory: "car_gasoline".to_string(),
            amount: Amount::new(100_000),
            unit: "km".to_string(),
            timestamp: 1_000,
            description: Some("daily commute".to_string()),
            metadata: BTreeMap::new(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_718_452_800, 0).single().unwrap()
    }

    #[test]
    fn create_derives_carbon_and_emits_event() {
        let mut engine = engine();
        let (record, event) = engine.create(new_emission(1)).unwrap();

        assert_eq!(record.carbon_equivalent, CentiKg::new(2400));
        assert_eq!(event.kind(), "record_created");
        assert_eq!(event.owner(), UserId(1));
        assert_eq!(event.ledger_total(), CentiKg::new(2400));
    }

    #[test]
    fn validation_failure_touches_nothing() {
        let mut engine = engine();
        let mut bad = new_emission(1);
        bad.subcategory = String::new();
        assert!(matches!(
            engine.create(bad),
            Err(EcotraceError::Validation { field: "subcategory", .. })
        ));
        assert_eq!(engine.ledger_total(UserId(1)).unwrap(), CentiKg::ZERO);
        assert_eq!(
            engine
                .list(UserId(1), &RecordFilter::default(), Pagination::default())
                .unwrap()
                .total_count,
            0
        );
    }

    #[test]
    fn update_recomputes_carbon_and_moves_ledger_by_difference() {
        let mut engine = engine();
        let (record, _) = engine.create(new_emission(1)).unwrap();

        let patch = EmissionPatch {
            amount: Some(Amount::new(50_000)),
            ..EmissionPatch::default()
        };
        let (updated, event) = engine.update(record.id, UserId(1), patch).unwrap();
        assert_eq!(updated.carbon_equivalent, CentiKg::new(1200));
        assert_eq!(event.ledger_total(), CentiKg::new(1200));
    }

    #[test]
    fn update_without_numeric_fields_keeps_carbon() {
        let mut engine = engine();
        let (record, _) = engine.create(new_emission(1)).unwrap();

        let patch = EmissionPatch {
            description: Some("changed note".to_string()),
            ..EmissionPatch::default()
        };
        let (updated, _) = engine.update(record.id, UserId(1), patch).unwrap();
        assert_eq!(updated.carbon_equivalent, record.carbon_equivalent);
        assert_eq!(updated.description.as_deref(), Some("changed note"));
    }

    #[test]
    fn cross_user_access_is_not_found() {
        let mut engine = engine();
        let (record, _) = engine.create(new_emission(1)).unwrap();

        assert!(matches!(
            engine.get(record.id, UserId(2)),
            Err(EcotraceError::NotFound)
        ));
        assert!(matches!(
            engine.update(record.id, UserId(2), EmissionPatch::default()),
            Err(EcotraceError::NotFound)
        ));
        assert!(matches!(
            engine.delete(record.id, UserId(2)),
            Err(EcotraceError::NotFound)
        ));
        // Nothing changed for the real owner.
        assert_eq!(engine.ledger_total(UserId(1)).unwrap(), CentiKg::new(2400));
    }

    #[test]
    fn delete_subtracts_and_second_delete_is_not_found() {
        let mut engine = engine();
        let (record, _) = engine.create(new_emission(1)).unwrap();

        let (_, event) = engine.delete(record.id, UserId(1)).unwrap();
        assert_eq!(event.ledger_total(), CentiKg::ZERO);
        assert!(matches!(
            engine.delete(record.id, UserId(1)),
            Err(EcotraceError::NotFound)
        ));
        assert_eq!(engine.ledger_total(UserId(1)).unwrap(), CentiKg::ZERO);
    }

    #[test]
    fn list_paginates_newest_first() {
        let mut engine = engine();
        for i in 0..5 {
            let mut emission = new_emission(1);
            emission.timestamp = i * 100;
            engine.create(emission).unwrap();
        }

        let page = engine
            .list(
                UserId(1),
                &RecordFilter::default(),
                Pagination { page: 1, limit: 2 },
            )
            .unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].timestamp, 400);

        let last = engine
            .list(
                UserId(1),
                &RecordFilter::default(),
                Pagination { page: 3, limit: 2 },
            )
            .unwrap();
        assert_eq!(last.records.len(), 1);
        assert_eq!(last.records[0].timestamp, 0);

        let beyond = engine
            .list(
                UserId(1),
                &RecordFilter::default(),
                Pagination { page: 9, limit: 2 },
            )
            .unwrap();
        assert!(beyond.records.is_empty());
        assert_eq!(beyond.total_count, 5);
    }

    #[test]
    fn absurd_page_number_yields_an_empty_page() {
        let mut engine = engine();
        engine.create(new_emission(1)).unwrap();

        // The skip offset must saturate, not wrap.
        let page = engine
            .list(
                UserId(1),
                &RecordFilter::default(),
                Pagination {
                    page: usize::MAX,
                    limit: 100,
                },
            )
            .unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total_count, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn stats_all_matches_ledger_total() {
        let mut engine = engine();
        engine.create(new_emission(1)).unwrap();
        let mut second = new_emission(1);
        second.category = Category::Food;
        second.subcategory = "beef".to_string();
        second.amount = Amount::new(2_000);
        engine.create(second).unwrap();

        let summary = engine.stats(UserId(1), &TimeRange::All, now()).unwrap();
        assert_eq!(
            summary.total_emissions,
            engine.ledger_total(UserId(1)).unwrap()
        );
        assert_eq!(summary.total_entries, 2);
    }

    #[test]
    fn verify_and_reconcile_round_trip() {
        let mut engine = engine();
        engine.create(new_emission(1)).unwrap();
        assert_eq!(engine.verify_ledger(UserId(1)).unwrap(), CentiKg::new(2400));

        let outcome = engine.reconcile_ledger(UserId(1)).unwrap();
        assert_eq!(outcome.drift(), 0);
    }
}
