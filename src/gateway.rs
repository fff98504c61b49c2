//! Mutation gateway: optimistic patch, remote write, reconcile.
//!
//! Every write first patches the local replica, then writes the backend, then
//! replaces the local record with the row the backend returned. A failed
//! write is reported to the caller and recorded on the store; the optimistic
//! patch is left for the next authoritative event to correct.
//!
//! `assign` and `reply` read the *remote* history before appending to it. The
//! read and the write are separate calls, so two writers racing on one record
//! can lose an entry.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    config::SyncConfig,
    error::{SyncError, SyncResult},
    query::{
        AnalyticsSummary, ConversationThread, HistoryEntry, HistoryStatus, QueryPatch, QueryRecord,
    },
    remote::{QueryFilter, RemoteError, RemoteStore},
    runtime::handle::SyncHandle,
    types::{QueryId, QueryStatus},
};

/// Status a reply leaves behind.
///
/// Resolving always wins; otherwise a `new` query moves to `in_progress` and
/// anything else is kept.
pub fn reply_status(current: QueryStatus, resolve_after_reply: bool) -> QueryStatus {
    if resolve_after_reply {
        QueryStatus::Resolved
    } else if current == QueryStatus::New {
        QueryStatus::InProgress
    } else {
        current
    }
}

/// Performs writes against the backend and reconciles the replica.
#[derive(Clone)]
pub struct MutationGateway {
    remote: Arc<dyn RemoteStore>,
    handle: SyncHandle,
    acting_user: String,
}

impl MutationGateway {
    /// Builds a gateway writing as `config.acting_user`.
    pub fn new(remote: Arc<dyn RemoteStore>, handle: SyncHandle, config: &SyncConfig) -> Self {
        Self {
            remote,
            handle,
            acting_user: config.acting_user.clone(),
        }
    }

    /// Sets `status` and refreshes `updated_at`.
    pub async fn update_status(&self, id: &QueryId, status: QueryStatus) -> SyncResult<QueryRecord> {
        let patch = QueryPatch {
            status: Some(status),
            updated_at: Some(Utc::now()),
            ..QueryPatch::default()
        };
        self.apply(id, patch).await
    }

    /// Assigns the query and appends `Assigned to <assignee>` to its history.
    pub async fn assign(&self, id: &QueryId, assignee: &str) -> SyncResult<QueryRecord> {
        let current = self.read_current(id).await?;
        let now = Utc::now();

        let mut history = current.history;
        history.push(HistoryEntry::new(
            format!("Assigned to {assignee}"),
            self.acting_user.as_str(),
            now,
        ));

        let patch = QueryPatch {
            assigned_to: Some(Some(assignee.to_string())),
            history: Some(history),
            updated_at: Some(now),
            ..QueryPatch::default()
        };
        self.apply(id, patch).await
    }

    /// Appends `Replied: <text>` to the history and applies [`reply_status`].
    ///
    /// Blank text is rejected before anything is read or written.
    pub async fn reply(&self, id: &QueryId, text: &str, resolve_after_reply: bool) -> SyncResult<QueryRecord> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::validation("reply text is empty"));
        }

        let current = self.read_current(id).await?;
        let now = Utc::now();

        let mut history = current.history;
        history.push(HistoryEntry::new(
            format!("Replied: {text}"),
            self.acting_user.as_str(),
            now,
        ));

        let patch = QueryPatch {
            status: Some(reply_status(current.status, resolve_after_reply)),
            history: Some(history),
            updated_at: Some(now),
            ..QueryPatch::default()
        };
        self.apply(id, patch).await
    }

    /// Filtered, paged read. Rows are returned, not merged into the replica.
    pub async fn fetch_filtered(&self, filter: &QueryFilter) -> SyncResult<Vec<QueryRecord>> {
        self.handle.begin_fetch().await?;
        let fetched = self.remote.fetch_queries(filter).await;
        self.handle.end_fetch().await?;
        match fetched {
            Ok(rows) => Ok(rows),
            Err(source) => {
                let err = SyncError::Fetch(source);
                warn!(error = %err, "filtered fetch failed");
                self.handle.record_error(&err).await?;
                Err(err)
            }
        }
    }

    /// Conversation thread for one query, as assembled by the backend.
    pub async fn conversation_thread(&self, id: &QueryId) -> SyncResult<ConversationThread> {
        self.remote
            .conversation_thread(id)
            .await
            .map_err(SyncError::Fetch)
    }

    /// Pulls the backend's analytics summary and stores it on the replica.
    pub async fn load_analytics(&self) -> SyncResult<AnalyticsSummary> {
        let summary = match self.remote.analytics_summary().await {
            Ok(summary) => summary,
            Err(source) => {
                let err = SyncError::Fetch(source);
                warn!(error = %err, "analytics fetch failed");
                self.handle.record_error(&err).await?;
                return Err(err);
            }
        };
        self.handle.set_analytics(summary.clone()).await?;
        Ok(summary)
    }

    async fn read_current(&self, id: &QueryId) -> SyncResult<HistoryStatus> {
        match self.remote.fetch_history_status(id).await {
            Ok(current) => Ok(current),
            Err(source) => {
                let err = match source {
                    RemoteError::NotFound(_) => SyncError::write(id, source),
                    other => SyncError::Fetch(other),
                };
                warn!(%id, error = %err, "read before write failed");
                let _ = self.handle.record_error(&err).await;
                Err(err)
            }
        }
    }

    async fn apply(&self, id: &QueryId, patch: QueryPatch) -> SyncResult<QueryRecord> {
        self.handle.patch(id.clone(), patch.clone()).await?;

        match self.remote.update_query(id, &patch).await {
            Ok(row) => {
                if self.handle.upsert(row.clone()).await.is_err() {
                    debug!(%id, "write confirmed after teardown; replica left as is");
                }
                Ok(row)
            }
            Err(source) => {
                let err = SyncError::write(id, source);
                warn!(%id, error = %err, "remote write failed; optimistic patch kept");
                let _ = self.handle.record_error(&err).await;
                Err(err)
            }
        }
    }
}
