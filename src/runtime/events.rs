//! Runtime event stream payloads.

use crate::{error::FaultKind, types::QueryId};

/// Events emitted from the single-writer runtime loop after each applied change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The whole replica was replaced.
    Seeded {
        /// Records now held.
        count: usize,
    },
    /// A record unknown to the replica was prepended.
    Inserted {
        /// Inserted id.
        id: QueryId,
    },
    /// A record was replaced by an authoritative row.
    Updated {
        /// Replaced id.
        id: QueryId,
    },
    /// An optimistic patch was merged into a record.
    Patched {
        /// Patched id.
        id: QueryId,
    },
    /// A failure was recorded on the store.
    Faulted {
        /// Failure class.
        kind: FaultKind,
    },
    /// The analytics summary was refreshed.
    AnalyticsUpdated,
}
