#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::{Barrier, Notify, broadcast};

use querysync::{
    query::{
        AnalyticsSummary, ConversationThread, HistoryStatus, QueryPatch, QueryRecord, Sender,
        SenderType, ThreadMessage,
    },
    remote::{ChangeEvent, ChangeStream, QueryFilter, RemoteError, RemoteResult, RemoteStore},
    types::{Channel, Priority, QueryId, QueryStatus, QueryType},
};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
        .single()
        .expect("valid time")
}

pub fn record(id: &str, status: QueryStatus, minutes_ago: i64) -> QueryRecord {
    let at = base_time() - Duration::minutes(minutes_ago);
    QueryRecord {
        id: QueryId::new(id),
        subject: format!("Subject {id}"),
        content: format!("Body of query {id}"),
        channel: Channel::Email,
        query_type: QueryType::Question,
        priority: Priority::Medium,
        status,
        sender: Sender {
            name: Some("Sarah Johnson".to_string()),
            email: Some("sarah.j@example.com".to_string()),
        },
        tags: vec!["billing".to_string()],
        assigned_to: None,
        history: vec![],
        created_at: at,
        updated_at: at,
    }
}

/// In-memory backend with switchable failures, gates, and call counters.
pub struct ScriptedRemote {
    rows: Mutex<Vec<QueryRecord>>,
    changes: Mutex<Option<broadcast::Sender<ChangeEvent>>>,
    live_feed: bool,
    fail_fetches: AtomicBool,
    fail_writes: AtomicBool,
    fetch_gate: Option<Arc<Notify>>,
    read_barrier: Option<Arc<Barrier>>,
    fetch_calls: AtomicUsize,
    read_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl ScriptedRemote {
    pub fn new(rows: Vec<QueryRecord>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            rows: Mutex::new(rows),
            changes: Mutex::new(Some(changes)),
            live_feed: true,
            fail_fetches: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fetch_gate: None,
            read_barrier: None,
            fetch_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_live_feed(mut self) -> Self {
        self.live_feed = false;
        self
    }

    /// Replaces the change feed with one holding at most `capacity` events.
    pub fn with_change_capacity(self, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        *self.changes.lock().expect("lock") = Some(changes);
        self
    }

    /// Drops the change feed sender, closing every subscription.
    pub fn close_changes(&self) {
        self.changes.lock().expect("lock").take();
    }

    fn emit(&self, event: ChangeEvent) {
        if let Some(changes) = self.changes.lock().expect("lock").as_ref() {
            let _ = changes.send(event);
        }
    }

    /// Bulk fetches block until the gate is notified.
    pub fn with_fetch_gate(mut self, gate: Arc<Notify>) -> Self {
        self.fetch_gate = Some(gate);
        self
    }

    /// Point reads wait on the barrier after reading.
    pub fn with_read_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.read_barrier = Some(barrier);
        self
    }

    pub fn fail_fetches(&self, on: bool) {
        self.fail_fetches.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn row(&self, id: &str) -> Option<QueryRecord> {
        let rows = self.rows.lock().expect("lock");
        rows.iter().find(|r| r.id.as_str() == id).cloned()
    }

    /// Changes a row without emitting a notification.
    pub fn mutate_silently(&self, id: &str, f: impl FnOnce(&mut QueryRecord)) {
        let mut rows = self.rows.lock().expect("lock");
        let row = rows
            .iter_mut()
            .find(|r| r.id.as_str() == id)
            .expect("row exists");
        f(row);
    }

    /// Creates a row and emits an insert notification.
    pub fn push_insert(&self, rec: QueryRecord) {
        self.rows.lock().expect("lock").push(rec.clone());
        self.emit(ChangeEvent::Inserted(rec));
    }

    /// Emits an update notification for a row already changed elsewhere.
    pub fn push_update(&self, rec: QueryRecord) {
        {
            let mut rows = self.rows.lock().expect("lock");
            if let Some(row) = rows.iter_mut().find(|r| r.id == rec.id) {
                *row = rec.clone();
            }
        }
        self.emit(ChangeEvent::Updated(rec));
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.fetch_calls() + self.read_calls() + self.write_calls()
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemote {
    async fn fetch_queries(&self, filter: &QueryFilter) -> RemoteResult<Vec<QueryRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.fetch_gate {
            gate.notified().await;
        }
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("scripted fetch failure".to_string()));
        }

        let mut rows: Vec<QueryRecord> = self
            .rows
            .lock()
            .expect("lock")
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows.into_iter().skip(filter.offset).take(filter.limit).collect())
    }

    async fn fetch_query(&self, id: &QueryId) -> RemoteResult<QueryRecord> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.row(id.as_str())
            .ok_or_else(|| RemoteError::NotFound(id.clone()))
    }

    async fn fetch_history_status(&self, id: &QueryId) -> RemoteResult<HistoryStatus> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let rec = self
            .row(id.as_str())
            .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
        if let Some(barrier) = &self.read_barrier {
            barrier.wait().await;
        }
        Ok(HistoryStatus {
            history: rec.history,
            status: rec.status,
        })
    }

    async fn update_query(&self, id: &QueryId, patch: &QueryPatch) -> RemoteResult<QueryRecord> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("scripted write failure".to_string()));
        }
        let updated = {
            let mut rows = self.rows.lock().expect("lock");
            let row = rows
                .iter_mut()
                .find(|r| &r.id == id)
                .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
            patch.apply_to(row);
            row.clone()
        };
        self.emit(ChangeEvent::Updated(updated.clone()));
        Ok(updated)
    }

    async fn conversation_thread(&self, id: &QueryId) -> RemoteResult<ConversationThread> {
        let query = self.fetch_query(id).await?;
        let messages = vec![ThreadMessage {
            sender_type: SenderType::User,
            message: query.content.clone(),
            created_at: query.created_at,
        }];
        Ok(ConversationThread { query, messages })
    }

    async fn analytics_summary(&self) -> RemoteResult<AnalyticsSummary> {
        let rows = self.rows.lock().expect("lock");
        let mut summary = AnalyticsSummary::default();
        for row in rows.iter() {
            summary.total_queries += 1;
            *summary
                .status_counts
                .entry(row.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(summary)
    }

    fn subscribe_changes(&self) -> RemoteResult<ChangeStream> {
        if !self.live_feed {
            return Err(RemoteError::Subscription("scripted: no live feed".to_string()));
        }
        self.changes
            .lock()
            .expect("lock")
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or_else(|| RemoteError::Subscription("scripted: feed closed".to_string()))
    }
}
