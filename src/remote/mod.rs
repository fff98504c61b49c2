pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::{
    query::{AnalyticsSummary, ConversationThread, HistoryStatus, QueryPatch, QueryRecord},
    types::{Priority, QueryId, QueryStatus},
};

/// Backend failures.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// No row with this id.
    #[error("query {0} not found")]
    NotFound(QueryId),
    /// Network or backend outage.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Change-notification channel could not be opened.
    #[error("subscription rejected: {0}")]
    Subscription(String),
    /// SQLite failure.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// Row payload could not be encoded or decoded.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// Background task failed to join.
    #[error("join error: {0}")]
    Join(String),
}

/// Result alias for backend calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Filter and page bounds for a bulk read. Rows come back newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    /// Status equality.
    pub status: Option<QueryStatus>,
    /// Priority equality.
    pub priority: Option<Priority>,
    /// Case-insensitive substring over subject or content.
    pub text: Option<String>,
    /// Rows to skip.
    pub offset: usize,
    /// Maximum rows returned.
    pub limit: usize,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            status: None,
            priority: None,
            text: None,
            offset: 0,
            limit: 50,
        }
    }
}

impl QueryFilter {
    /// The `limit` most recent rows, unfiltered.
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Converts a 1-based page number into offset bounds. Page 0 is treated as page 1.
    pub fn page(mut self, page: usize, limit: usize) -> Self {
        self.offset = page.saturating_sub(1).saturating_mul(limit);
        self.limit = limit;
        self
    }

    /// True when `rec` passes the predicates (page bounds not considered).
    pub fn matches(&self, rec: &QueryRecord) -> bool {
        if self.status.is_some_and(|s| s != rec.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != rec.priority) {
            return false;
        }
        match self.text.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                rec.subject.to_lowercase().contains(&needle)
                    || rec.content.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

/// Insert/update notification for the query collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A row was created.
    Inserted(QueryRecord),
    /// A row was modified.
    Updated(QueryRecord),
}

impl ChangeEvent {
    /// Payload row.
    pub fn record(&self) -> &QueryRecord {
        match self {
            Self::Inserted(r) | Self::Updated(r) => r,
        }
    }

    /// Consumes the event into its row.
    pub fn into_record(self) -> QueryRecord {
        match self {
            Self::Inserted(r) | Self::Updated(r) => r,
        }
    }
}

/// Live stream of change events. Dropping it releases the subscription.
pub type ChangeStream = broadcast::Receiver<ChangeEvent>;

/// The backend of record.
///
/// Implementations are shared behind an `Arc` by the feed adapter and the
/// mutation gateway; every read and write may suspend.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Bulk read, newest first, filtered and paged.
    async fn fetch_queries(&self, filter: &QueryFilter) -> RemoteResult<Vec<QueryRecord>>;

    /// Point read of one full row.
    async fn fetch_query(&self, id: &QueryId) -> RemoteResult<QueryRecord>;

    /// Point read of just `history` and `status`.
    async fn fetch_history_status(&self, id: &QueryId) -> RemoteResult<HistoryStatus> {
        let rec = self.fetch_query(id).await?;
        Ok(HistoryStatus {
            history: rec.history,
            status: rec.status,
        })
    }

    /// Point write of the fields set in `patch`; returns the post-write row.
    async fn update_query(&self, id: &QueryId, patch: &QueryPatch) -> RemoteResult<QueryRecord>;

    /// Ordered conversation thread for one query.
    async fn conversation_thread(&self, id: &QueryId) -> RemoteResult<ConversationThread>;

    /// Precomputed aggregate statistics.
    async fn analytics_summary(&self) -> RemoteResult<AnalyticsSummary>;

    /// Registers for insert/update notifications. Fails synchronously when
    /// the live channel is unavailable.
    fn subscribe_changes(&self) -> RemoteResult<ChangeStream>;
}
