//! # Persistent Storage
//!
//! Disk-backed storage for the record store and ledger, built on redb.

mod redb_store;

pub use redb_store::RedbStore;
