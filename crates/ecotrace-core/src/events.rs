//! # Emission Events
//!
//! Facts emitted by the engine after each committed mutation. Each event
//! carries the affected record and the owner's post-mutation ledger total,
//! so a subscriber can track their running footprint without re-fetching.
//!
//! The core only defines the events; delivery (fan-out, ordering, drop
//! policy) is the app's concern.

use crate::types::{CentiKg, EmissionRecord, UserId};

/// A committed mutation on a user's emission records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmissionEvent {
    Created {
        record: EmissionRecord,
        ledger_total: CentiKg,
    },
    Updated {
        record: EmissionRecord,
        ledger_total: CentiKg,
    },
    Deleted {
        record: EmissionRecord,
        ledger_total: CentiKg,
    },
}

impl EmissionEvent {
    /// The user whose records changed (and the only user who may see this
    /// event).
    #[must_use]
    pub const fn owner(&self) -> UserId {
        match self {
            Self::Created { record, .. }
            | Self::Updated { record, .. }
            | Self::Deleted { record, .. } => record.owner,
        }
    }

    /// The owner's ledger total after the mutation committed.
    #[must_use]
    pub const fn ledger_total(&self) -> CentiKg {
        match self {
            Self::Created { ledger_total, .. }
            | Self::Updated { ledger_total, .. }
            | Self::Deleted { ledger_total, .. } => *ledger_total,
        }
    }

    /// Wire name of the event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "record_created",
            Self::Updated { .. } => "record_updated",
            Self::Deleted { .. } => "record_deleted",
        }
    }
}
