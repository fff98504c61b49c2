//! In-memory replica of the remote query set.

/// Record store, snapshots, and the replace-by-id merge rule.
pub mod store;
