//! # ecotrace-core
//!
//! The deterministic emission accounting engine for Ecotrace - THE LOGIC.
//!
//! This crate implements the CORE substrate: a factor table, an emission
//! calculator, an owner-scoped record store, a per-user aggregate ledger,
//! and a statistics engine, orchestrated by `Engine`.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is the ONLY place where accounting state exists (stateful)
//! - Is deterministic: fixed-point integers, BTreeMap ordering, no clock
//!   (callers pass `now` explicitly)
//! - Is minimal: if a feature is not essential to emission accounting, it
//!   lives in the app crate
//! - Has NO async, NO network dependencies (pure Rust)
//!
//! Floating-point values exist only at the JSON/CLI boundary; the accounting
//! path is integer arithmetic end to end.

// =============================================================================
// MODULES
// =============================================================================

pub mod calculator;
pub mod engine;
pub mod events;
pub mod factors;
pub mod ledger;
pub mod primitives;
pub mod stats;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Amount, Category, CentiKg, EcotraceError, EmissionDraft, EmissionRecord, FactorGrams,
    RecordId, UserId,
};

// =============================================================================
// RE-EXPORTS: Accounting Engine
// =============================================================================

pub use engine::{Engine, EmissionPatch, NewEmission, Pagination, RecordPage, StorageBackend};
pub use events::EmissionEvent;
pub use factors::FactorTable;
pub use ledger::Reconciliation;
pub use stats::{CategoryBreakdown, StatsSummary, TimeRange};
pub use storage::RedbStore;
pub use store::{EmissionStore, MemStore, RecordFilter};
