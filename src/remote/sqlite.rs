//! SQLite-backed backend of record with an in-process change feed.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

use crate::{
    query::{
        AnalyticsSummary, ConversationThread, QueryPatch, QueryRecord, SenderType, ThreadMessage,
    },
    types::{Priority, QueryId, QueryStatus},
};

use super::{ChangeEvent, ChangeStream, QueryFilter, RemoteError, RemoteResult, RemoteStore};

const CHANGE_FEED_CAPACITY: usize = 1024;

/// SQLite implementation of [`RemoteStore`].
///
/// Rows are stored as JSON payloads next to the columns used for filtering.
/// Every committed insert or update is published on the change feed.
pub struct SqliteRemote {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<ChangeEvent>,
    live_feed: bool,
}

impl SqliteRemote {
    /// Opens or creates a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> RemoteResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory database.
    pub fn open_in_memory() -> RemoteResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> RemoteResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
            live_feed: true,
        })
    }

    /// Enables or disables the live change feed. When disabled,
    /// [`RemoteStore::subscribe_changes`] fails.
    pub fn with_live_feed(mut self, enabled: bool) -> Self {
        self.live_feed = enabled;
        self
    }

    /// Creates a row, as an external producer (e.g. mail ingestion) would.
    pub async fn insert_query(&self, record: QueryRecord) -> RemoteResult<QueryRecord> {
        let row = record.clone();
        self.with_conn(move |conn| {
            let payload = serde_json::to_vec(&row)?;
            conn.execute(
                "INSERT INTO queries(id, created_at_ms, status, priority, subject, content, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.id.as_str(),
                    row.created_at.timestamp_millis(),
                    row.status.as_str(),
                    row.priority.as_str(),
                    row.subject,
                    row.content,
                    payload,
                ],
            )?;
            Ok(())
        })
        .await?;

        debug!(id = %record.id, "query inserted");
        let _ = self.changes.send(ChangeEvent::Inserted(record.clone()));
        Ok(record)
    }

    /// Stores a reply message in the query's thread.
    pub async fn add_reply(
        &self,
        id: &QueryId,
        sender_type: SenderType,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> RemoteResult<()> {
        let id = id.clone();
        let message = message.into();
        self.with_conn(move |conn| {
            ensure_exists(conn, &id)?;
            conn.execute(
                "INSERT INTO query_replies(query_id, sender_type, message, created_at_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.as_str(),
                    sender_type_str(sender_type),
                    message,
                    at.timestamp_millis(),
                    at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> RemoteResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RemoteResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| RemoteError::Join(e.to_string()))?
    }
}

#[async_trait]
impl RemoteStore for SqliteRemote {
    async fn fetch_queries(&self, filter: &QueryFilter) -> RemoteResult<Vec<QueryRecord>> {
        let filter = filter.clone();
        let status = filter.status.map(QueryStatus::as_str);
        let priority = filter.priority.map(Priority::as_str);
        // SQLite's lower() only folds ASCII, so text matching happens after decoding
        // and paging moves with it.
        let text_search = filter.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        let (limit, offset) = if text_search {
            (-1, 0)
        } else {
            (
                i64::try_from(filter.limit).unwrap_or(i64::MAX),
                i64::try_from(filter.offset).unwrap_or(i64::MAX),
            )
        };

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, payload FROM queries
                 WHERE (?1 IS NULL OR status = ?1)
                   AND (?2 IS NULL OR priority = ?2)
                 ORDER BY created_at_ms DESC, id DESC
                 LIMIT ?3 OFFSET ?4",
            )?;
            let rows = stmt.query_map(params![status, priority, limit, offset], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (id, payload) = row?;
                match decode_payload(&payload) {
                    Ok(rec) => out.push(rec),
                    Err(err) => warn!(%id, error = %err, "skipping undecodable row"),
                }
            }

            if text_search {
                out = out
                    .into_iter()
                    .filter(|rec| filter.matches(rec))
                    .skip(filter.offset)
                    .take(filter.limit)
                    .collect();
            }
            Ok(out)
        })
        .await
    }

    async fn fetch_query(&self, id: &QueryId) -> RemoteResult<QueryRecord> {
        let id = id.clone();
        self.with_conn(move |conn| load_record(conn, &id)).await
    }

    async fn update_query(&self, id: &QueryId, patch: &QueryPatch) -> RemoteResult<QueryRecord> {
        let id = id.clone();
        let patch = patch.clone();
        let updated = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let mut rec = load_record(&tx, &id)?;
                patch.apply_to(&mut rec);
                let payload = serde_json::to_vec(&rec)?;
                tx.execute(
                    "UPDATE queries SET status = ?2, priority = ?3, subject = ?4, content = ?5, payload = ?6
                     WHERE id = ?1",
                    params![
                        rec.id.as_str(),
                        rec.status.as_str(),
                        rec.priority.as_str(),
                        rec.subject,
                        rec.content,
                        payload,
                    ],
                )?;
                tx.commit()?;
                Ok(rec)
            })
            .await?;

        let _ = self.changes.send(ChangeEvent::Updated(updated.clone()));
        Ok(updated)
    }

    async fn conversation_thread(&self, id: &QueryId) -> RemoteResult<ConversationThread> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let query = load_record(conn, &id)?;

            let mut messages: Vec<ThreadMessage> = query
                .history
                .iter()
                .map(|h| ThreadMessage {
                    sender_type: SenderType::System,
                    message: h.action.clone(),
                    created_at: h.timestamp,
                })
                .collect();

            messages.push(ThreadMessage {
                sender_type: SenderType::User,
                message: query.content.clone(),
                created_at: query.created_at,
            });

            let mut stmt = conn.prepare(
                "SELECT sender_type, message, created_at FROM query_replies
                 WHERE query_id = ?1 ORDER BY created_at_ms ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (sender_type, message, created_at) = row?;
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| RemoteError::Unavailable(format!("bad reply timestamp: {e}")))?
                    .with_timezone(&Utc);
                messages.push(ThreadMessage {
                    sender_type: parse_sender_type(&sender_type),
                    message,
                    created_at,
                });
            }

            messages.sort_by_key(|m| m.created_at);
            Ok(ConversationThread { query, messages })
        })
        .await
    }

    async fn analytics_summary(&self) -> RemoteResult<AnalyticsSummary> {
        self.with_conn(|conn| {
            let mut summary = AnalyticsSummary::default();

            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM queries GROUP BY status")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (status, count) = row?;
                summary.total_queries += count as u64;
                summary.status_counts.insert(status, count as u64);
            }

            summary.new_queries = summary
                .status_counts
                .get(QueryStatus::New.as_str())
                .copied()
                .unwrap_or(0);
            summary.in_progress_queries = summary
                .status_counts
                .get(QueryStatus::InProgress.as_str())
                .copied()
                .unwrap_or(0);
            let urgent: i64 = conn.query_row(
                "SELECT COUNT(*) FROM queries WHERE priority = ?1",
                params![Priority::Urgent.as_str()],
                |row| row.get(0),
            )?;
            summary.urgent_queries = urgent as u64;
            Ok(summary)
        })
        .await
    }

    fn subscribe_changes(&self) -> RemoteResult<ChangeStream> {
        if !self.live_feed {
            return Err(RemoteError::Subscription("live feed disabled".to_string()));
        }
        Ok(self.changes.subscribe())
    }
}

fn load_record(conn: &Connection, id: &QueryId) -> RemoteResult<QueryRecord> {
    let payload: Option<Vec<u8>> = conn
        .query_row(
            "SELECT payload FROM queries WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    let Some(payload) = payload else {
        return Err(RemoteError::NotFound(id.clone()));
    };
    decode_payload(&payload)
}

fn ensure_exists(conn: &Connection, id: &QueryId) -> RemoteResult<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM queries WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    found.map(|_| ()).ok_or_else(|| RemoteError::NotFound(id.clone()))
}

fn decode_payload(payload: &[u8]) -> RemoteResult<QueryRecord> {
    Ok(serde_json::from_slice(payload)?)
}

fn sender_type_str(sender_type: SenderType) -> &'static str {
    match sender_type {
        SenderType::System => "system",
        SenderType::User => "user",
        SenderType::Admin => "admin",
    }
}

fn parse_sender_type(raw: &str) -> SenderType {
    match raw {
        "admin" => SenderType::Admin,
        "system" => SenderType::System,
        _ => SenderType::User,
    }
}
