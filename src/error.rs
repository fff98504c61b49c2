//! Error taxonomy surfaced to callers of the sync layer.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{remote::RemoteError, types::QueryId};

/// Errors returned by sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A bulk or point read failed.
    #[error("fetch failed: {0}")]
    Fetch(#[source] RemoteError),
    /// A mutation's remote write failed. Any optimistic patch stays in place.
    #[error("write to query {id} failed: {source}")]
    Write {
        /// Target record.
        id: QueryId,
        /// Backend failure.
        #[source]
        source: RemoteError,
    },
    /// Caller input rejected before any remote call.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Live subscription could not be established.
    #[error("subscription setup failed: {0}")]
    SubscriptionSetup(#[source] RemoteError),
    /// The sync context was torn down; the call had no effect.
    #[error("sync context is no longer active")]
    Inactive,
}

impl SyncError {
    /// Shorthand for [`SyncError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for [`SyncError::Write`].
    pub fn write(id: &QueryId, source: RemoteError) -> Self {
        Self::Write {
            id: id.clone(),
            source,
        }
    }
}

/// Result alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Which class of failure a [`StoreFault`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Read failure.
    Fetch,
    /// Write failure.
    Write,
}

/// Cloneable error record kept on the store for readers to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFault {
    /// Failure class.
    pub kind: FaultKind,
    /// Rendered error message.
    pub message: String,
    /// When it was recorded.
    pub at: DateTime<Utc>,
}

impl StoreFault {
    /// Captures `err` now.
    pub fn from_error(err: &SyncError) -> Self {
        let kind = match err {
            SyncError::Write { .. } => FaultKind::Write,
            _ => FaultKind::Fetch,
        };
        Self {
            kind,
            message: err.to_string(),
            at: Utc::now(),
        }
    }
}
