//! # Redb Record Store
//!
//! Disk-backed implementation of `EmissionStore` using redb for crash safety
//! and ACID semantics.
//!
//! The transaction layout is the whole point: every mutation writes the
//! record table AND the owner's ledger row inside ONE write transaction, so
//! a crash between "record exists" and "ledger counted it" is impossible.
//! redb serializes writers, which makes the ledger read-modify-write an
//! atomic increment.

use crate::store::{EmissionStore, RecordFilter, sort_newest_first};
use crate::types::{
    CentiKg, EcotraceError, EmissionDraft, EmissionRecord, RecordId, UserId,
};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

// =============================================================================
// TABLE DEFINITIONS
// =============================================================================

/// Record id -> postcard-encoded `EmissionRecord`.
const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");

/// (owner, record id) -> record timestamp. Composite key enables per-owner
/// range scans without touching other users' rows.
const OWNER_INDEX: TableDefinition<(u64, u64), i64> = TableDefinition::new("owner_index");

/// Owner -> cached ledger total in centi-kg.
const LEDGER: TableDefinition<u64, i64> = TableDefinition::new("ledger");

/// Store-level metadata (next record id).
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

// =============================================================================
// REDB STORE
// =============================================================================

/// A disk-backed emission store using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// Next available record ID, mirrored from META after each commit.
    next_record_id: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("next_record_id", &self.next_record_id)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create an emission database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EcotraceError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| EcotraceError::Io(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| EcotraceError::Io(e.to_string()))?;
            let _ = write_txn
                .open_table(RECORDS)
                .map_err(|e| EcotraceError::Io(e.to_string()))?;
            let _ = write_txn
                .open_table(OWNER_INDEX)
                .map_err(|e| EcotraceError::Io(e.to_string()))?;
            let _ = write_txn
                .open_table(LEDGER)
                .map_err(|e| EcotraceError::Io(e.to_string()))?;
            let _ = write_txn
                .open_table(META)
                .map_err(|e| EcotraceError::Io(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| EcotraceError::Io(e.to_string()))?;
        }

        // Load next record id
        let read_txn = db
            .begin_read()
            .map_err(|e| EcotraceError::Io(e.to_string()))?;
        let next_record_id = {
            let table = read_txn
                .open_table(META)
                .map_err(|e| EcotraceError::Io(e.to_string()))?;
            table
                .get("next_record_id")
                .map_err(|e| EcotraceError::Io(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        Ok(Self { db, next_record_id })
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), EcotraceError> {
        self.db
            .compact()
            .map_err(|e| EcotraceError::Io(e.to_string()))?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<EmissionRecord, EcotraceError> {
        postcard::from_bytes(bytes).map_err(|e| EcotraceError::Serialization(e.to_string()))
    }

    fn encode(record: &EmissionRecord) -> Result<Vec<u8>, EcotraceError> {
        postcard::to_stdvec(record).map_err(|e| EcotraceError::Serialization(e.to_string()))
    }
}

impl EmissionStore for RedbStore {
    fn insert(
        &mut self,
        draft: EmissionDraft,
    ) -> Result<(EmissionRecord, CentiKg), EcotraceError> {
        let id = RecordId(self.next_record_id);
        let record = EmissionRecord::from_draft(id, draft);
        let record_bytes = Self::encode(&record)?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let new_total;
        {
            let mut records = write_txn
                .open_table(RECORDS)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            let mut owner_index = write_txn
                .open_table(OWNER_INDEX)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            let mut ledger = write_txn
                .open_table(LEDGER)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            let mut meta = write_txn
                .open_table(META)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;

            records
                .insert(id.0, record_bytes.as_slice())
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            owner_index
                .insert((record.owner.0, id.0), record.timestamp)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;

            let current = ledger
                .get(record.owner.0)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0);
            let total = CentiKg::new(current).saturating_add(record.carbon_equivalent.value());
            ledger
                .insert(record.owner.0, total.value())
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            new_total = total;

            meta.insert("next_record_id", id.0 + 1)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;

        // Update in-memory state only after successful commit.
        self.next_record_id = id.0 + 1;
        Ok((record, new_total))
    }

    fn find_one(
        &self,
        id: RecordId,
        owner: UserId,
    ) -> Result<Option<EmissionRecord>, EcotraceError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let records = read_txn
            .open_table(RECORDS)
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let Some(bytes) = records
            .get(id.0)
            .map_err(|e| EcotraceError::Storage(e.to_string()))?
        else {
            return Ok(None);
        };
        let record = Self::decode(bytes.value())?;
        if record.owner != owner {
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn find(
        &self,
        owner: UserId,
        filter: &RecordFilter,
    ) -> Result<Vec<EmissionRecord>, EcotraceError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let owner_index = read_txn
            .open_table(OWNER_INDEX)
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let records_table = read_txn
            .open_table(RECORDS)
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;

        let mut records = Vec::new();
        for entry in owner_index
            .range((owner.0, 0)..=(owner.0, u64::MAX))
            .map_err(|e| EcotraceError::Storage(e.to_string()))?
        {
            let (key, _) = entry.map_err(|e| EcotraceError::Storage(e.to_string()))?;
            let (_, record_id) = key.value();
            let Some(bytes) = records_table
                .get(record_id)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?
            else {
                continue;
            };
            let record = Self::decode(bytes.value())?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn update(
        &mut self,
        record: EmissionRecord,
    ) -> Result<Option<(EmissionRecord, CentiKg)>, EcotraceError> {
        let record_bytes = Self::encode(&record)?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let new_total;
        {
            let mut records = write_txn
                .open_table(RECORDS)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;

            // Re-read the stored carbon value under this transaction; the
            // ledger delta is always `new - old` as persisted, never a
            // caller-supplied old value.
            let old = {
                let Some(bytes) = records
                    .get(record.id.0)
                    .map_err(|e| EcotraceError::Storage(e.to_string()))?
                else {
                    return Ok(None);
                };
                Self::decode(bytes.value())?
            };
            if old.owner != record.owner {
                return Ok(None);
            }

            let mut owner_index = write_txn
                .open_table(OWNER_INDEX)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            let mut ledger = write_txn
                .open_table(LEDGER)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;

            records
                .insert(record.id.0, record_bytes.as_slice())
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            owner_index
                .insert((record.owner.0, record.id.0), record.timestamp)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;

            let delta = record.carbon_equivalent.value() - old.carbon_equivalent.value();
            let current = ledger
                .get(record.owner.0)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0);
            let total = CentiKg::new(current).saturating_add(delta);
            ledger
                .insert(record.owner.0, total.value())
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            new_total = total;
        }
        write_txn
            .commit()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;

        Ok(Some((record, new_total)))
    }

    fn delete(
        &mut self,
        id: RecordId,
        owner: UserId,
    ) -> Result<Option<(EmissionRecord, CentiKg)>, EcotraceError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let removed;
        let new_total;
        {
            let mut records = write_txn
                .open_table(RECORDS)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;

            let old = {
                let Some(bytes) = records
                    .get(id.0)
                    .map_err(|e| EcotraceError::Storage(e.to_string()))?
                else {
                    return Ok(None);
                };
                Self::decode(bytes.value())?
            };
            if old.owner != owner {
                return Ok(None);
            }

            let mut owner_index = write_txn
                .open_table(OWNER_INDEX)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            let mut ledger = write_txn
                .open_table(LEDGER)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;

            records
                .remove(id.0)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            owner_index
                .remove((owner.0, id.0))
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;

            let current = ledger
                .get(owner.0)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0);
            let total = CentiKg::new(current).saturating_add(-old.carbon_equivalent.value());
            ledger
                .insert(owner.0, total.value())
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;

            removed = old;
            new_total = total;
        }
        write_txn
            .commit()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;

        Ok(Some((removed, new_total)))
    }

    fn ledger_total(&self, owner: UserId) -> Result<CentiKg, EcotraceError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let ledger = read_txn
            .open_table(LEDGER)
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let total = ledger
            .get(owner.0)
            .map_err(|e| EcotraceError::Storage(e.to_string()))?
            .map(|v| v.value())
            .unwrap_or(0);
        Ok(CentiKg::new(total))
    }

    fn apply_ledger_delta(
        &mut self,
        owner: UserId,
        delta: i64,
    ) -> Result<CentiKg, EcotraceError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let new_total;
        {
            let mut ledger = write_txn
                .open_table(LEDGER)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            let current = ledger
                .get(owner.0)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0);
            let total = CentiKg::new(current).saturating_add(delta);
            ledger
                .insert(owner.0, total.value())
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            new_total = total;
        }
        write_txn
            .commit()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        Ok(new_total)
    }

    fn set_ledger_total(&mut self, owner: UserId, total: CentiKg) -> Result<(), EcotraceError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        {
            let mut ledger = write_txn
                .open_table(LEDGER)
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
            ledger
                .insert(owner.0, total.value())
                .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        Ok(())
    }

    fn record_count(&self, owner: UserId) -> Result<usize, EcotraceError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let owner_index = read_txn
            .open_table(OWNER_INDEX)
            .map_err(|e| EcotraceError::Storage(e.to_string()))?;
        let count = owner_index
            .range((owner.0, 0)..=(owner.0, u64::MAX))
            .map_err(|e| EcotraceError::Storage(e.to_string()))?
            .count();
        Ok(count)
    }
}

// =============================================================================
// TESTS
// =============================================================================
